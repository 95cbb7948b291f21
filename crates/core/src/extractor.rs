use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::direct::DirectManifest;
use crate::errors::Result;
use crate::media::{CountingSink, IntermediaryLink, MediaSink};
use crate::megacloud::MegaCloud;
use crate::packed::PackedPlayer;
use crate::streamtape::StreamTape;

/// read-only inputs shared by every strategy during one extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractContext {
    /// passphrase for encrypted sources; `None` when the key fetch failed or
    /// was not attempted.
    pub decrypt_key: Option<String>,
    /// when set, stream labels carry the embed host next to the strategy name.
    pub probe_server_names: bool,
}

impl ExtractContext {
    pub fn with_key(decrypt_key: Option<String>) -> Self {
        Self {
            decrypt_key,
            probe_server_names: false,
        }
    }

    /// label for a stream produced by `strategy` for `link`.
    pub fn label(&self, strategy: &str, link: &Url) -> String {
        match (self.probe_server_names, link.host_str()) {
            (true, Some(host)) => format!("{strategy} ({host})"),
            _ => strategy.to_string(),
        }
    }
}

/// one provider-specific way of turning an intermediary link into streams.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// whether this strategy claims `link`. must not touch the network.
    fn can_handle(&self, link: &Url, ctx: &ExtractContext) -> bool;

    /// pushes streams and subtitles into `sink`. an empty result is `Ok(())`
    /// with nothing emitted.
    async fn extract(
        &self,
        link: &IntermediaryLink,
        ctx: &ExtractContext,
        sink: &dyn MediaSink,
    ) -> Result<()>;
}

/// ordered strategies; the first one that claims a link is the only one run.
///
/// a claimed link that fails or yields nothing does not fall through to the
/// next strategy.
pub struct ExtractorChain {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorChain {
    pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    /// host-keyed set tried first on every legacy link.
    pub fn generic(client: Client) -> crate::Result<Self> {
        Ok(Self::new(vec![
            Box::new(PackedPlayer::new(client.clone())),
            Box::new(StreamTape::new(client)?),
            Box::new(DirectManifest::new()),
        ]))
    }

    /// fallback chain for links the generic set could not resolve. holds only
    /// strategies the generic set does not contain.
    pub fn legacy(client: Client) -> Self {
        Self::new(vec![
            Box::new(MegaCloud::decrypting(client.clone())),
            Box::new(MegaCloud::plain(client)),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// the strategy that would be used for `link`, if any.
    pub fn select(&self, link: &Url, ctx: &ExtractContext) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(link, ctx))
            .map(|e| e.as_ref())
    }

    /// runs the selected strategy and reports whether it emitted at least one
    /// stream. failures are logged and reported as `false`.
    pub async fn run(
        &self,
        link: &IntermediaryLink,
        ctx: &ExtractContext,
        sink: &dyn MediaSink,
    ) -> bool {
        let Ok(parsed) = Url::parse(&link.url) else {
            warn!(link = %link.url, "unparseable intermediary link");
            return false;
        };

        let Some(extractor) = self.select(&parsed, ctx) else {
            debug!(link = %link.url, "no extractor claims link");
            return false;
        };

        let counting = CountingSink::new(sink);
        info!(strategy = extractor.name(), link = %link.url, "extracting");

        if let Err(err) = extractor.extract(link, ctx, &counting).await {
            warn!(strategy = extractor.name(), link = %link.url, error = %err, "extractor failed");
        }

        let emitted = counting.count();
        debug!(strategy = extractor.name(), emitted, "extractor finished");
        emitted > 0
    }
}
