use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request client build failed while {context}: {source}")]
    BuildClient {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed while {context}: {source}")]
    Request {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body while {context}: {source}")]
    ResponseBody {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode JSON while {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context} returned {status}\nresponse text:\n{body}")]
    HttpStatus {
        context: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid link {link}")]
    InvalidLink { link: String },

    #[error("missing redirect location header")]
    MissingRedirectLocation,

    #[error("invalid base index {base} for alphabet key")]
    InvalidAlphabetBaseIndex { base: usize },

    #[error("invalid offset")]
    InvalidOffset,

    #[error("invalid base")]
    InvalidBase,

    #[error("packed player payload value out of range")]
    PayloadOverflow,

    #[error("packed player payload not found in {link}")]
    MissingPackedPayload { link: String },

    #[error("no manifest url found in decoded player payload")]
    MissingManifest,

    #[error("streamtape robotlink not found in {link}")]
    MissingRobotLink { link: String },

    #[error("embed id missing from {link}")]
    MissingEmbedId { link: String },

    #[error("sources are encrypted and no decryption key is available")]
    MissingKey,

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("decryption failed: {reason}")]
    Decrypt { reason: &'static str },

    #[error("number parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
}
