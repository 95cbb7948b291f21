use thiserror::Error;

use hianime_core::ExtractError;

pub type Result<T> = std::result::Result<T, HianimeError>;

#[derive(Debug, Error)]
pub enum HianimeError {
    #[error("failed to parse base URL {url}")]
    BaseUrl { url: String },

    #[error("extractor error: {0}")]
    Extract(#[from] ExtractError),

    #[error("invalid episode data {data:?}; expected \"<sub|dub>|<path>?ep=<id>\"")]
    InvalidEpisodeData { data: String },

    #[error("invalid anime link; unable to parse anime id from {link}")]
    InvalidAnimeLink { link: String },

    #[error("HTTP request failed while {context}: {source}")]
    Request {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode JSON while {context}: {source}")]
    Json {
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

    #[error("{context} returned {status}\nresponse text:\n{body}")]
    HttpStatus {
        context: String,
        status: reqwest::StatusCode,
        body: String,
    },
}
