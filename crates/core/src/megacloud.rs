use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, info};

use crate::crypto::decrypt_passphrase;
use crate::errors::{ExtractError, Result};
use crate::extractor::{ExtractContext, Extractor};
use crate::http::{ensure_success, host_matches, origin_from_url};
use crate::media::{IntermediaryLink, MediaSink, StreamDescriptor, SubtitleTrack};

const DEFAULT_HOSTS: &[&str] = &["megacloud", "rabbitstream", "rapid-cloud", "rapidcloud"];

#[derive(Debug, Deserialize)]
struct EmbedSources {
    sources: SourcesField,
    #[serde(default)]
    tracks: Vec<EmbedTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourcesField {
    Plain(Vec<EmbedSource>),
    Encrypted(String),
}

#[derive(Debug, Deserialize)]
struct EmbedSource {
    file: String,
}

#[derive(Debug, Deserialize)]
struct EmbedTrack {
    file: String,
    label: Option<String>,
}

/// megacloud / rabbitstream embed player.
///
/// the embed page id is exchanged for a sources document whose `sources` field
/// is either a plain list or a CryptoJS AES blob keyed by the remote
/// passphrase. two variants sit in the chain: one claims links only when a key
/// is available, the other never decrypts.
pub struct MegaCloud {
    client: Client,
    hosts: Vec<String>,
    decrypts: bool,
}

impl MegaCloud {
    pub fn decrypting(client: Client) -> Self {
        Self::build(client, true)
    }

    pub fn plain(client: Client) -> Self {
        Self::build(client, false)
    }

    fn build(client: Client, decrypts: bool) -> Self {
        Self {
            client,
            hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
            decrypts,
        }
    }

    /// replaces the host patterns this strategy claims.
    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    fn embed_id(link: &Url) -> Option<&str> {
        link.path_segments()?
            .filter(|s| !s.is_empty())
            .next_back()
    }

    fn sources_url(link: &Url, id: &str) -> Option<String> {
        let origin = origin_from_url(link.as_str())?;
        let endpoint = if link.path().starts_with("/embed-2/") {
            "/embed-2/ajax/e-1/getSources"
        } else {
            "/ajax/embed-6/getSources"
        };
        Some(format!("{origin}{endpoint}?id={id}"))
    }

    fn source_files(&self, sources: SourcesField, ctx: &ExtractContext) -> Result<Vec<String>> {
        let plain = match sources {
            SourcesField::Plain(list) => list,
            SourcesField::Encrypted(blob) => {
                let key = match (&ctx.decrypt_key, self.decrypts) {
                    (Some(key), true) => key,
                    _ => return Err(ExtractError::MissingKey),
                };
                let decrypted = decrypt_passphrase(&blob, key)?;
                serde_json::from_str::<Vec<EmbedSource>>(&decrypted).map_err(|source| {
                    ExtractError::Json {
                        context: "parsing decrypted sources".to_string(),
                        source,
                    }
                })?
            }
        };

        Ok(plain.into_iter().map(|s| s.file).collect())
    }
}

#[async_trait]
impl Extractor for MegaCloud {
    fn name(&self) -> &'static str {
        if self.decrypts {
            "megacloud-decrypt"
        } else {
            "megacloud"
        }
    }

    fn can_handle(&self, link: &Url, ctx: &ExtractContext) -> bool {
        if self.decrypts && ctx.decrypt_key.is_none() {
            return false;
        }
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
        let id = Self::embed_id(&parsed).ok_or_else(|| ExtractError::MissingEmbedId {
            link: link.url.clone(),
        })?;
        let sources_url = Self::sources_url(&parsed, id).ok_or_else(|| {
            ExtractError::InvalidLink {
                link: link.url.clone(),
            }
        })?;

        info!(%sources_url, "requesting embed sources");
        let resp = self
            .client
            .get(&sources_url)
            .header(reqwest::header::REFERER, link.url.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await
            .map_err(|source| ExtractError::Request {
                context: format!("loading embed sources {sources_url}"),
                source,
            })?;
        let resp = ensure_success(resp, "embed sources endpoint").await?;
        let body = resp
            .text()
            .await
            .map_err(|source| ExtractError::ResponseBody {
                context: "reading embed sources".to_string(),
                source,
            })?;
        let payload: EmbedSources =
            serde_json::from_str(&body).map_err(|source| ExtractError::Json {
                context: "parsing embed sources".to_string(),
                source,
            })?;

        for track in payload.tracks {
            sink.subtitle(SubtitleTrack {
                language: track.label,
                url: track.file,
            });
        }

        let files = self.source_files(payload.sources, ctx)?;
        debug!(count = files.len(), "embed sources resolved");

        let referer = origin_from_url(&link.url)
            .map(|origin| format!("{origin}/"))
            .unwrap_or_default();
        let label = ctx.label("MegaCloud", &parsed);
        for file in files.into_iter().filter(|f| !f.is_empty()) {
            sink.stream(StreamDescriptor::new(label.clone(), file).with_referer(&referer));
        }

        Ok(())
    }
}
