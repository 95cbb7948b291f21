use std::collections::HashSet;

use futures::future::join_all;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hianime_core::{
    EmissionGuard, ExtractContext, IntermediaryLink, MediaSink, StreamDescriptor, SubtitleTrack,
};

use crate::client::HianimeClient;
use crate::errors::Result;
use crate::models::{EpisodeReference, MirrorServer, SkipWindow, SourcePayload};

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<ApiSources>,
}

#[derive(Debug, Deserialize)]
struct ApiSources {
    #[serde(default)]
    tracks: Vec<ApiTrack>,
    intro: Option<ApiWindow>,
    outro: Option<ApiWindow>,
    #[serde(default)]
    sources: Vec<ApiSource>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    file: String,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiWindow {
    start: u64,
    end: u64,
}

#[derive(Debug, Deserialize)]
struct ApiSource {
    url: String,
}

#[derive(Debug, Deserialize)]
struct LegacyLink {
    link: String,
}

impl From<ApiWindow> for SkipWindow {
    fn from(w: ApiWindow) -> Self {
        SkipWindow {
            start: w.start,
            end: w.end,
        }
    }
}

impl From<ApiSources> for SourcePayload {
    fn from(data: ApiSources) -> Self {
        let mut seen = HashSet::new();
        let manifest_urls = data
            .sources
            .into_iter()
            .map(|s| s.url)
            .filter(|url| !url.trim().is_empty() && seen.insert(url.clone()))
            .collect();

        let subtitle_tracks = data
            .tracks
            .into_iter()
            .map(|t| SubtitleTrack {
                language: t.label,
                url: t.file,
            })
            .collect();

        SourcePayload {
            manifest_urls,
            subtitle_tracks,
            intro: data.intro.map(Into::into),
            outro: data.outro.map(Into::into),
        }
    }
}

impl HianimeClient {
    /// queries the structured sources api for one server label.
    ///
    /// `None` means the api answered without usable data.
    pub async fn fetch_source_payload(
        &self,
        reference: &EpisodeReference,
        server: &str,
    ) -> Result<Option<SourcePayload>> {
        let url = format!("{}/api/v2/hianime/episode/sources", self.api_url);
        let episode = format!("{}?ep={}", reference.slug(), reference.episode_id);
        let envelope: ApiEnvelope = self
            .get_json(
                &url,
                &[
                    ("animeEpisodeId", episode.as_str()),
                    ("server", server),
                    ("category", reference.audio_track.as_str()),
                ],
                &format!("requesting sources for server {server}"),
            )
            .await?;

        if !envelope.success {
            return Ok(None);
        }
        Ok(envelope.data.map(SourcePayload::from))
    }

    /// asks the site for the embed link behind a mirror entry.
    pub async fn fetch_intermediary_link(&self, internal_id: &str) -> Result<IntermediaryLink> {
        let url = format!("{}/ajax/v2/episode/sources", self.base_url);
        let legacy: LegacyLink = self
            .get_json(
                &url,
                &[("id", internal_id)],
                &format!("requesting embed link for mirror {internal_id}"),
            )
            .await?;

        Ok(IntermediaryLink {
            url: legacy.link,
            referer_hint: self.referer_hint.clone(),
        })
    }

    /// resolves every mirror of `reference` and pushes results into `sink`.
    ///
    /// mirrors run concurrently and report into the sink as soon as they have
    /// something. returns whether at least one stream was delivered. dropping
    /// the returned future cancels all in-flight mirror work.
    pub async fn load_links(&self, reference: &EpisodeReference, sink: &dyn MediaSink) -> bool {
        let servers = match self
            .fetch_servers(&reference.episode_id, reference.audio_track)
            .await
        {
            Ok(servers) => servers,
            Err(err) => {
                warn!(episode_id = %reference.episode_id, error = %err, "server list unavailable");
                return false;
            }
        };

        if servers.is_empty() {
            info!(episode_id = %reference.episode_id, "no mirrors listed");
            return false;
        }

        let guard = EmissionGuard::new(sink, self.blacklist_marker.clone());
        join_all(
            servers
                .iter()
                .map(|server| self.resolve_mirror(reference, server, &guard)),
        )
        .await;

        let delivered = guard.delivered();
        info!(episode_id = %reference.episode_id, delivered, "link resolution finished");
        delivered > 0
    }

    /// [`load_links`](Self::load_links), abandoned as soon as `cancel` fires.
    pub async fn load_links_with_cancel(
        &self,
        reference: &EpisodeReference,
        sink: &dyn MediaSink,
        cancel: &CancellationToken,
    ) -> bool {
        tokio::select! {
            found = self.load_links(reference, sink) => found,
            _ = cancel.cancelled() => {
                info!(episode_id = %reference.episode_id, "link resolution cancelled");
                false
            }
        }
    }

    async fn resolve_mirror(
        &self,
        reference: &EpisodeReference,
        server: &MirrorServer,
        sink: &EmissionGuard<'_>,
    ) {
        futures::join!(
            self.emit_direct(reference, server, sink),
            self.emit_legacy(server, sink),
        );
    }

    async fn emit_direct(
        &self,
        reference: &EpisodeReference,
        server: &MirrorServer,
        sink: &EmissionGuard<'_>,
    ) {
        let payload = match self.fetch_source_payload(reference, &server.name).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(server = %server.name, "sources api returned no data");
                return;
            }
            Err(err) => {
                warn!(server = %server.name, error = %err, "sources api request failed");
                return;
            }
        };

        if payload.manifest_urls.is_empty() {
            debug!(server = %server.name, "not found");
        } else {
            let label = format!(
                "{} {} {}",
                self.provider_name,
                server.name.to_uppercase(),
                reference.audio_track.as_str().to_uppercase()
            );
            for url in &payload.manifest_urls {
                sink.stream(StreamDescriptor::new(label.clone(), url.clone()));
            }
        }

        debug!(server = %server.name, intro = ?payload.intro, outro = ?payload.outro, "skip windows");

        for track in payload.subtitle_tracks {
            sink.subtitle(track);
        }
    }

    async fn emit_legacy(&self, server: &MirrorServer, sink: &EmissionGuard<'_>) {
        let link = match self.fetch_intermediary_link(&server.internal_id).await {
            Ok(link) => link,
            Err(err) => {
                warn!(server = %server.name, error = %err, "embed link request failed");
                return;
            }
        };

        // blacklisted generic output must not count as resolved
        let generic_sink = EmissionGuard::new(sink, self.blacklist_marker.clone());
        self.generic
            .run(&link, &ExtractContext::default(), &generic_sink)
            .await;
        if generic_sink.delivered() > 0 {
            return;
        }

        let decrypt_key = match self.keys.fetch().await {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(error = %err, "decryption key unavailable; skipping decrypting extractor");
                None
            }
        };

        let ctx = ExtractContext {
            decrypt_key,
            probe_server_names: false,
        };
        if !self.legacy.run(&link, &ctx, sink).await {
            debug!(server = %server.name, link = %link.url, "no extractor produced streams");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::HianimeBuilder;
    use hianime_core::megacloud::MegaCloud;
    use hianime_core::{CollectingSink, ExtractorChain};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // `openssl enc -aes-256-cbc -md md5 -salt -pass pass:e6testkey -base64 -A`
    const ENCRYPTED_SOURCES: &str = "U2FsdGVkX1+Dgw4lKDFWYC5vtYpcQwlCg413QcDiAUa06s5X4DXaXr1TmUZB955N2cbpdDaCxwHGnjVCx7Mg8ti+ttOyGdVNXtG1yfkwEEA=";

    const TWO_SERVERS: &str = r#"
        <div class="item server-item" data-type="sub" data-id="1" data-server-id="4"><a>HD-1</a></div>
        <div class="item server-item" data-type="sub" data-id="2" data-server-id="1"><a>HD-2</a></div>
    "#;

    fn reference() -> EpisodeReference {
        EpisodeReference::parse("sub|/watch/one-piece-100?ep=12345").expect("valid data")
    }

    fn builder(server: &MockServer) -> HianimeBuilder {
        HianimeBuilder::new()
            .base_url(&server.uri())
            .api_url(&server.uri())
            .key_url(&format!("{}/key.txt", server.uri()))
    }

    async fn mount_servers(server: &MockServer, html: &str) {
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/servers"))
            .and(query_param("episodeId", "12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "html": html
            })))
            .mount(server)
            .await;
    }

    async fn mount_sources(server: &MockServer, label: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/v2/hianime/episode/sources"))
            .and(query_param("server", label))
            .and(query_param("category", "sub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_embed_link(server: &MockServer, id: &str, link: &str) {
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/sources"))
            .and(query_param("id", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "iframe",
                "link": link,
                "server": 4
            })))
            .mount(server)
            .await;
    }

    fn local_megacloud_chain() -> ExtractorChain {
        let client = reqwest::Client::new();
        ExtractorChain::new(vec![
            Box::new(MegaCloud::decrypting(client.clone()).with_hosts(["127.0.0.1"])),
            Box::new(MegaCloud::plain(client).with_hosts(["127.0.0.1"])),
        ])
    }

    #[tokio::test]
    async fn only_servers_with_sources_produce_streams() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_sources(
            &server,
            "hd-1",
            serde_json::json!({
                "success": true,
                "data": {
                    "tracks": [
                        {"file": "https://cc.example.com/eng.vtt", "label": "English", "kind": "captions", "default": true},
                        {"file": "https://cc.example.com/thumbnails.vtt", "kind": "thumbnails"}
                    ],
                    "intro": {"start": 31, "end": 110},
                    "outro": {"start": 1300, "end": 1390},
                    "sources": [{"url": "https://cdn.example.com/hd1/master.m3u8", "type": "hls"}],
                    "anilistID": 21,
                    "malID": 21
                }
            }),
        )
        .await;
        mount_sources(
            &server,
            "hd-2",
            serde_json::json!({"success": true, "data": {"tracks": [], "sources": []}}),
        )
        .await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(client.load_links(&reference(), &sink).await);

        let streams = sink.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].label, "HiAnime HD-1 SUB");
        assert_eq!(streams[0].url, "https://cdn.example.com/hd1/master.m3u8");

        let mut subtitles: Vec<String> = sink.subtitles().into_iter().map(|t| t.url).collect();
        subtitles.sort();
        assert_eq!(
            subtitles,
            vec![
                "https://cc.example.com/eng.vtt",
                "https://cc.example.com/thumbnails.vtt"
            ]
        );
    }

    #[tokio::test]
    async fn no_mirrors_is_a_negative_result() {
        let server = MockServer::start().await;
        mount_servers(&server, "<div class=\"servers\"></div>").await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(!client.load_links(&reference(), &sink).await);
        assert!(sink.streams().is_empty());
        assert!(sink.subtitles().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_list_is_a_negative_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/servers"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();
        assert!(!client.load_links(&reference(), &sink).await);
    }

    #[tokio::test]
    async fn subtitles_are_forwarded_without_manifests() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_sources(
            &server,
            "hd-1",
            serde_json::json!({
                "success": true,
                "data": {
                    "tracks": [{"file": "https://cc.example.com/eng.vtt", "label": "English", "kind": "captions"}],
                    "sources": []
                }
            }),
        )
        .await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(!client.load_links(&reference(), &sink).await);
        assert!(sink.streams().is_empty());
        assert_eq!(sink.subtitles().len(), 1);
    }

    #[tokio::test]
    async fn one_stream_per_distinct_manifest() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_sources(
            &server,
            "hd-1",
            serde_json::json!({
                "success": true,
                "data": {
                    "sources": [
                        {"url": "https://cdn.example.com/a.m3u8", "type": "hls"},
                        {"url": "https://cdn.example.com/a.m3u8", "type": "hls"},
                        {"url": "https://cdn.example.com/b.m3u8", "type": "hls"},
                        {"url": "", "type": "hls"}
                    ]
                }
            }),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/hianime/episode/sources"))
            .and(query_param("server", "hd-2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(client.load_links(&reference(), &sink).await);
        let mut urls: Vec<String> = sink.streams().into_iter().map(|s| s.url).collect();
        urls.sort();
        assert_eq!(
            urls,
            vec!["https://cdn.example.com/a.m3u8", "https://cdn.example.com/b.m3u8"]
        );
    }

    #[tokio::test]
    async fn blacklisted_streams_never_reach_the_sink() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_sources(
            &server,
            "hd-1",
            serde_json::json!({
                "success": true,
                "data": {"sources": [{"url": "https://betterstream.cc/x/master.m3u8", "type": "hls"}]}
            }),
        )
        .await;
        mount_embed_link(&server, "2", "https://cdn.betterstream.cc/y/master.m3u8").await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(!client.load_links(&reference(), &sink).await);
        assert!(sink.streams().is_empty());
    }

    #[tokio::test]
    async fn generic_extractor_handles_direct_manifest_links() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_embed_link(&server, "1", "https://cdn.example.com/legacy/master.m3u8").await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(client.load_links(&reference(), &sink).await);
        let streams = sink.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].url, "https://cdn.example.com/legacy/master.m3u8");
        assert_eq!(
            streams[0].headers.get("Referer").map(String::as_str),
            Some("https://rapid-cloud.ru/")
        );
    }

    #[tokio::test]
    async fn key_failure_skips_only_the_decrypting_strategy() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_embed_link(&server, "1", &format!("{}/embed-2/e-1/abc?k=1", server.uri())).await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/ajax/e-1/getSources"))
            .and(query_param("id", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sources": [{"file": "https://cdn.example.com/plain.m3u8", "type": "hls"}],
                "tracks": []
            })))
            .mount(&server)
            .await;

        let client = builder(&server)
            .legacy_extractors(local_megacloud_chain())
            .build()
            .expect("client should build");
        let sink = CollectingSink::new();

        assert!(client.load_links(&reference(), &sink).await);
        let streams = sink.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].label, "MegaCloud");
        assert_eq!(streams[0].url, "https://cdn.example.com/plain.m3u8");
    }

    #[tokio::test]
    async fn fetched_key_decrypts_legacy_sources() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_embed_link(&server, "2", &format!("{}/embed-2/e-1/xyz?k=1", server.uri())).await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("e6testkey"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/ajax/e-1/getSources"))
            .and(query_param("id", "xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sources": ENCRYPTED_SOURCES,
                "tracks": [{"file": "https://cc.example.com/en.vtt", "label": "English", "kind": "captions"}],
                "encrypted": true
            })))
            .mount(&server)
            .await;

        let client = builder(&server)
            .legacy_extractors(local_megacloud_chain())
            .build()
            .expect("client should build");
        let sink = CollectingSink::new();

        assert!(client.load_links(&reference(), &sink).await);
        assert_eq!(sink.streams()[0].url, "https://cdn.example.com/master.m3u8");
        assert_eq!(sink.subtitles().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_abandons_resolution() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/servers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(30))
                    .set_body_json(serde_json::json!({"status": true, "html": TWO_SERVERS})),
            )
            .mount(&server)
            .await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let found = tokio::time::timeout(
            Duration::from_secs(5),
            client.load_links_with_cancel(&reference(), &sink, &cancel),
        )
        .await
        .expect("cancellation should end resolution promptly");

        assert!(!found);
        assert!(sink.streams().is_empty());
    }

    #[tokio::test]
    async fn embed_link_is_resolved_even_when_direct_sources_succeed() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_sources(
            &server,
            "hd-1",
            serde_json::json!({
                "success": true,
                "data": {"sources": [{"url": "https://cdn.example.com/api/master.m3u8", "type": "hls"}]}
            }),
        )
        .await;
        mount_embed_link(&server, "1", "https://cdn.example.com/embed/master.m3u8").await;

        let client = builder(&server).build().expect("client should build");
        let sink = CollectingSink::new();

        assert!(client.load_links(&reference(), &sink).await);
        let mut urls: Vec<String> = sink.streams().into_iter().map(|s| s.url).collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/api/master.m3u8",
                "https://cdn.example.com/embed/master.m3u8"
            ]
        );
    }

    #[tokio::test]
    async fn blacklist_applies_to_legacy_chain_output() {
        let server = MockServer::start().await;
        mount_servers(&server, TWO_SERVERS).await;
        mount_embed_link(&server, "1", &format!("{}/embed-2/e-1/bad?k=1", server.uri())).await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/ajax/e-1/getSources"))
            .and(query_param("id", "bad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sources": [{"file": "https://cdn.betterstream.cc/z/master.m3u8", "type": "hls"}],
                "tracks": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = builder(&server)
            .legacy_extractors(local_megacloud_chain())
            .build()
            .expect("client should build");
        let sink = CollectingSink::new();

        assert!(!client.load_links(&reference(), &sink).await);
        assert!(sink.streams().is_empty());
    }
}
