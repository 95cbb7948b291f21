use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::client::{HianimeClient, HtmlEnvelope};
use crate::errors::Result;
use crate::models::{AudioTrack, MirrorServer};

impl HianimeClient {
    /// lists the distinct mirrors serving `episode_id` in `track`.
    ///
    /// a page with no matching entries yields an empty list, not an error.
    pub async fn fetch_servers(
        &self,
        episode_id: &str,
        track: AudioTrack,
    ) -> Result<Vec<MirrorServer>> {
        if episode_id.trim().is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/ajax/v2/episode/servers", self.base_url);
        let envelope: HtmlEnvelope = self
            .get_json(
                &url,
                &[("episodeId", episode_id)],
                "requesting episode server list",
            )
            .await?;

        let servers = parse_servers(&envelope.html, track);
        info!(episode_id, %track, count = servers.len(), "found mirrors");
        Ok(servers)
    }
}

/// mirror entries tagged with `track`, first occurrence of each id and name kept.
pub(crate) fn parse_servers(html: &str, track: AudioTrack) -> Vec<MirrorServer> {
    let doc = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse(&format!(
        r#".server-item[data-type="{}"][data-id]"#,
        track.as_str()
    )) else {
        return Vec::new();
    };

    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut servers = Vec::new();

    for item in doc.select(&selector) {
        let internal_id = item
            .value()
            .attr("data-id")
            .unwrap_or_default()
            .trim()
            .to_string();
        if internal_id.is_empty() {
            continue;
        }

        let text = item.text().collect::<String>().trim().to_lowercase();
        let name = if text.is_empty() {
            internal_id.clone()
        } else {
            text
        };

        if !seen_ids.insert(internal_id.clone()) || !seen_names.insert(name.clone()) {
            debug!(%internal_id, %name, "skipping duplicate mirror");
            continue;
        }

        servers.push(MirrorServer { name, internal_id });
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::HianimeBuilder;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SERVERS_HTML: &str = r#"
        <div class="ps_-block ps_-block-sub servers-sub">
            <div class="item server-item" data-type="sub" data-id="641" data-server-id="4"><a class="btn">HD-1</a></div>
            <div class="item server-item" data-type="sub" data-id="642" data-server-id="1"><a class="btn">HD-2</a></div>
            <div class="item server-item" data-type="sub" data-id="641" data-server-id="4"><a class="btn">HD-1</a></div>
        </div>
        <div class="ps_-block ps_-block-sub servers-dub">
            <div class="item server-item" data-type="dub" data-id="900" data-server-id="4"><a class="btn">HD-1</a></div>
        </div>
    "#;

    #[test]
    fn dedups_preserving_first_seen_order() {
        let servers = parse_servers(SERVERS_HTML, AudioTrack::Sub);
        assert_eq!(
            servers,
            vec![
                MirrorServer {
                    name: "hd-1".into(),
                    internal_id: "641".into()
                },
                MirrorServer {
                    name: "hd-2".into(),
                    internal_id: "642".into()
                },
            ]
        );
    }

    #[test]
    fn filters_by_audio_track() {
        let servers = parse_servers(SERVERS_HTML, AudioTrack::Dub);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].internal_id, "900");
    }

    #[test]
    fn unexpected_layout_yields_nothing() {
        assert!(parse_servers("<p>maintenance</p>", AudioTrack::Sub).is_empty());
        assert!(parse_servers("", AudioTrack::Sub).is_empty());
    }

    #[tokio::test]
    async fn fetch_servers_reads_html_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/servers"))
            .and(query_param("episodeId", "12345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "html": SERVERS_HTML
            })))
            .mount(&server)
            .await;

        let client = HianimeBuilder::new()
            .base_url(&server.uri())
            .build()
            .expect("client should build");

        let servers = client
            .fetch_servers("12345", AudioTrack::Sub)
            .await
            .expect("server list should load");
        assert_eq!(servers.len(), 2);
        assert!(client.fetch_servers("", AudioTrack::Sub).await.expect("no request").is_empty());
    }
}
