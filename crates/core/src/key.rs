use reqwest::Client;
use tracing::{debug, info};

use crate::errors::{ExtractError, Result};
use crate::http::ensure_success;

pub const DEFAULT_KEY_URL: &str = "https://raw.githubusercontent.com/enimax-anime/key/e6/key.txt";

/// fetches the passphrase used by the encrypted megacloud sources.
///
/// every call goes to the network; there is no cache and no retry.
#[derive(Debug, Clone)]
pub struct KeyProvider {
    client: Client,
    url: String,
}

impl KeyProvider {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<String> {
        info!(url = %self.url, "fetching decryption key");
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| ExtractError::Request {
                context: format!("fetching decryption key from {}", self.url),
                source,
            })?;

        let resp = ensure_success(resp, "decryption key endpoint").await?;
        let key = resp
            .text()
            .await
            .map_err(|source| ExtractError::ResponseBody {
                context: "reading decryption key".to_string(),
                source,
            })?
            .trim()
            .to_string();

        debug!(len = key.len(), "fetched decryption key");
        Ok(key)
    }
}
