use hianime_core::{DEFAULT_KEY_URL, ExtractorChain};

use crate::client::HianimeClient;
use crate::errors::Result;

pub const BASE_URL: &str = "https://hianime.to";
pub const API_URL: &str = "http://localhost:4000";
pub const REFERER_HINT: &str = "https://rapid-cloud.ru/";
pub const BLACKLIST_MARKER: &str = "betterstream";
pub const PROVIDER_NAME: &str = "HiAnime";

pub struct HianimeBuilder {
    pub(crate) base_url: String,
    pub(crate) api_url: String,
    pub(crate) key_url: String,
    pub(crate) referer_hint: String,
    pub(crate) blacklist_marker: String,
    pub(crate) provider_name: String,
    pub(crate) generic: Option<ExtractorChain>,
    pub(crate) legacy: Option<ExtractorChain>,
}

impl Default for HianimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HianimeBuilder {
    /// creates a builder pointing at the public site and a local sources api.
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_url: API_URL.to_string(),
            key_url: DEFAULT_KEY_URL.to_string(),
            referer_hint: REFERER_HINT.to_string(),
            blacklist_marker: BLACKLIST_MARKER.to_string(),
            provider_name: PROVIDER_NAME.to_string(),
            generic: None,
            legacy: None,
        }
    }

    /// sets the site's base url (scheme and host, no trailing slash needed).
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// sets the base url of the structured sources api.
    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    /// sets where the decryption passphrase is fetched from.
    pub fn key_url(mut self, url: &str) -> Self {
        self.key_url = url.to_string();
        self
    }

    /// referer handed to extractors along with every intermediary link.
    pub fn referer_hint(mut self, referer: &str) -> Self {
        self.referer_hint = referer.to_string();
        self
    }

    /// streams whose url contains `marker` are never delivered. empty disables.
    pub fn blacklist_marker(mut self, marker: &str) -> Self {
        self.blacklist_marker = marker.to_string();
        self
    }

    pub fn provider_name(mut self, name: &str) -> Self {
        self.provider_name = name.to_string();
        self
    }

    /// replaces the host-keyed extractor set tried first on legacy links.
    pub fn generic_extractors(mut self, chain: ExtractorChain) -> Self {
        self.generic = Some(chain);
        self
    }

    /// replaces the fallback extractor chain.
    pub fn legacy_extractors(mut self, chain: ExtractorChain) -> Self {
        self.legacy = Some(chain);
        self
    }

    /// builds a [`HianimeClient`] using the configured options.
    pub fn build(self) -> Result<HianimeClient> {
        HianimeClient::from_builder(self)
    }
}
