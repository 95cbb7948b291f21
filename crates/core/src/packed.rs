use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::errors::{ExtractError, Result};
use crate::extractor::{ExtractContext, Extractor};
use crate::http::{get_text, host_matches, origin_from_url};
use crate::media::{IntermediaryLink, MediaSink, StreamDescriptor};

const DEFAULT_HOSTS: &[&str] = &["kwik"];
const BASE_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ+/";
const RETRIES: u8 = 3;

static PACKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\(\s*"([^",]*)"\s*,\s*\d+\s*,\s*"([^",]*)"\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*\d+[a-zA-Z]?\s*\)"#,
    )
    .expect("packed payload regex must compile")
});

static MANIFEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(https?:)?//[^"'\s\\]+\.m3u8[^"'\s\\]*"#).expect("manifest regex must compile")
});

/// embed players whose page hides the source behind the `(h,u,n,t,e,r)`
/// obfuscation wrapper.
pub struct PackedPlayer {
    client: Client,
    hosts: Vec<String>,
}

impl PackedPlayer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    fn decode_base(input: &str, from_base: usize, to_base: usize) -> Result<i64> {
        let from_alphabet = &BASE_ALPHABET[..from_base];
        let to_alphabet = &BASE_ALPHABET[..to_base];

        let mut value: i64 = 0;
        for (idx, ch) in input.chars().rev().enumerate() {
            if let Some(pos) = from_alphabet.find(ch)
                && pos > 0
            {
                value = u32::try_from(idx)
                    .ok()
                    .and_then(|exp| (from_base as i64).checked_pow(exp))
                    .and_then(|place| place.checked_mul(pos as i64))
                    .and_then(|digit| value.checked_add(digit))
                    .ok_or(ExtractError::PayloadOverflow)?;
            }
        }

        if value == 0 {
            return Ok(0);
        }

        let mut v = value;
        let mut out = String::new();
        while v > 0 {
            let i = (v % to_base as i64) as usize;
            out.insert(0, to_alphabet.chars().nth(i).unwrap_or('0'));
            v /= to_base as i64;
        }

        Ok(out.parse::<i64>()?)
    }

    pub(crate) fn decode_payload(
        encoded: &str,
        alphabet_key: &str,
        offset: i64,
        base: usize,
    ) -> Result<String> {
        if base == 0 || base > 10 {
            return Err(ExtractError::InvalidBase);
        }

        let sentinel = alphabet_key
            .chars()
            .nth(base)
            .ok_or(ExtractError::InvalidAlphabetBaseIndex { base })?;

        let mut output = String::new();
        for chunk in encoded.split(sentinel).filter(|c| !c.is_empty()) {
            let mut replaced = chunk.to_string();
            for (idx, c) in alphabet_key.chars().enumerate() {
                replaced = replaced.replace(c, &idx.to_string());
            }

            let code = Self::decode_base(&replaced, base, 10)?
                .checked_sub(offset)
                .ok_or(ExtractError::PayloadOverflow)?;
            output.push(
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\0'),
            );
        }

        Ok(output)
    }

    /// decodes the first packed payload on `page`.
    pub(crate) fn unpack(page: &str) -> Result<Option<String>> {
        let Some(caps) = PACKED_RE.captures(page) else {
            return Ok(None);
        };

        let encoded = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let alphabet_key = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let offset = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .ok_or(ExtractError::InvalidOffset)?;
        let base = caps
            .get(4)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .ok_or(ExtractError::InvalidBase)?;

        Self::decode_payload(encoded, alphabet_key, offset, base).map(Some)
    }

    fn find_manifest(decoded: &str, scheme: &str) -> Option<String> {
        let found = MANIFEST_RE.find(decoded)?.as_str();
        if found.starts_with("//") {
            Some(format!("{scheme}:{found}"))
        } else {
            Some(found.to_string())
        }
    }

    async fn fetch_manifest(&self, link: &IntermediaryLink, scheme: &str) -> Result<String> {
        let mut last_err = ExtractError::MissingPackedPayload {
            link: link.url.clone(),
        };

        for attempt in 1..=RETRIES {
            let page = get_text(&self.client, &link.url, &link.referer_hint)
                .await?
                .replace(['\n', '\r'], "");

            match Self::unpack(&page) {
                Ok(Some(decoded)) => {
                    return Self::find_manifest(&decoded, scheme)
                        .ok_or(ExtractError::MissingManifest);
                }
                Ok(None) => {
                    debug!(link = %link.url, attempt, "packed payload not found; retrying");
                }
                Err(err) => {
                    debug!(link = %link.url, attempt, error = %err, "failed to decode packed payload; retrying");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

#[async_trait]
impl Extractor for PackedPlayer {
    fn name(&self) -> &'static str {
        "packed-player"
    }

    fn can_handle(&self, link: &Url, _ctx: &ExtractContext) -> bool {
        link.host_str()
            .is_some_and(|host| host_matches(host, &self.hosts))
    }

    async fn extract(
        &self,
        link: &IntermediaryLink,
        ctx: &ExtractContext,
        sink: &dyn MediaSink,
    ) -> Result<()> {
        let parsed = Url::parse(&link.url).map_err(|_| ExtractError::InvalidLink {
            link: link.url.clone(),
        })?;

        info!(link = %link.url, "unpacking embed player");
        let manifest = self.fetch_manifest(link, parsed.scheme()).await?;
        debug!(%manifest, "packed player manifest found");

        let referer = origin_from_url(&link.url)
            .map(|origin| format!("{origin}/"))
            .unwrap_or_default();
        sink.stream(
            StreamDescriptor::new(ctx.label("Kwik", &parsed), manifest).with_referer(&referer),
        );
        Ok(())
    }
}
