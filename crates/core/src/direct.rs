use async_trait::async_trait;
use reqwest::Url;

use crate::errors::Result;
use crate::extractor::{ExtractContext, Extractor};
use crate::media::{IntermediaryLink, MediaSink, StreamDescriptor};

const MANIFEST_SUFFIX: &str = ".m3u8";

/// links that already point at a manifest are passed through as they are.
#[derive(Debug, Default)]
pub struct DirectManifest;

impl DirectManifest {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for DirectManifest {
    fn name(&self) -> &'static str {
        "direct-manifest"
    }

    fn can_handle(&self, link: &Url, _ctx: &ExtractContext) -> bool {
        link.path().ends_with(MANIFEST_SUFFIX)
    }

    async fn extract(
        &self,
        link: &IntermediaryLink,
        ctx: &ExtractContext,
        sink: &dyn MediaSink,
    ) -> Result<()> {
        let label = Url::parse(&link.url)
            .map(|url| ctx.label("Direct", &url))
            .unwrap_or_else(|_| "Direct".to_string());
        sink.stream(StreamDescriptor::new(label, link.url.clone()).with_referer(&link.referer_hint));
        Ok(())
    }
}
