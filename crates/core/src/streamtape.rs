use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{LOCATION, REFERER};
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::errors::{ExtractError, Result};
use crate::extractor::{ExtractContext, Extractor};
use crate::http::{build_no_redirect_client, get_text, host_matches};
use crate::media::{IntermediaryLink, MediaSink, StreamDescriptor};

const DEFAULT_HOSTS: &[&str] = &["streamtape", "strtape", "stape"];

static ROBOTLINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"getElementById\(\s*'robotlink'\s*\)\.innerHTML\s*=\s*'([^']+)'\s*\+\s*\(\s*'([^']+)'\s*\)\.substring\((\d+)\)"#,
    )
    .expect("robotlink regex must compile")
});

/// streamtape pages assemble a `get_video` url in script; that url redirects
/// to the cdn file.
pub struct StreamTape {
    client: Client,
    no_redirect_client: Client,
    hosts: Vec<String>,
}

impl StreamTape {
    pub fn new(client: Client) -> Result<Self> {
        Ok(Self {
            client,
            no_redirect_client: build_no_redirect_client()?,
            hosts: DEFAULT_HOSTS.iter().map(|h| h.to_string()).collect(),
        })
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn robot_link(page: &str, scheme: &str) -> Option<String> {
        let caps = ROBOTLINK_RE.captures(page)?;
        let head = caps.get(1)?.as_str();
        let tail = caps.get(2)?.as_str();
        let skip = caps.get(3)?.as_str().parse::<usize>().ok()?;

        let joined = format!("{head}{}", tail.get(skip..).unwrap_or_default());
        if joined.starts_with("//") {
            Some(format!("{scheme}:{joined}"))
        } else {
            Some(joined)
        }
    }

    async fn follow_once(&self, url: &str, referer: &str) -> Result<String> {
        let resp = self
            .no_redirect_client
            .get(url)
            .header(REFERER, referer)
            .send()
            .await
            .map_err(|source| ExtractError::Request {
                context: format!("requesting streamtape video {url}"),
                source,
            })?;

        if resp.status().is_redirection() {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|h| h.to_str().ok())
                .ok_or(ExtractError::MissingRedirectLocation)?;
            debug!(redirect_location = %location, "streamtape redirect");
            return Ok(location.to_string());
        }

        if resp.status().is_success() {
            return Ok(url.to_string());
        }

        let status = resp.status();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        Err(ExtractError::HttpStatus {
            context: "streamtape get_video".to_string(),
            status,
            body,
        })
    }
}

#[async_trait]
impl Extractor for StreamTape {
    fn name(&self) -> &'static str {
        "streamtape"
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

        info!(link = %link.url, "resolving streamtape link");
        let page = get_text(&self.client, &link.url, &link.referer_hint).await?;
        let video = Self::robot_link(&page, parsed.scheme()).ok_or_else(|| {
            ExtractError::MissingRobotLink {
                link: link.url.clone(),
            }
        })?;

        let location = self.follow_once(&video, &link.url).await?;
        sink.stream(
            StreamDescriptor::new(ctx.label("StreamTape", &parsed), location)
                .with_referer(&link.url),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::CollectingSink;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(host: &str) -> String {
        format!(
            "<script>document.getElementById('robotlink').innerHTML = '//{host}/get_video?id=v1&expires=9&ip=x&token=' + ('xcdtokenAbC').substring(4);</script>"
        )
    }

    #[test]
    fn robot_link_joins_and_skips_prefix() {
        assert_eq!(
            StreamTape::robot_link(&page("streamtape.com"), "https").as_deref(),
            Some("https://streamtape.com/get_video?id=v1&expires=9&ip=x&token=tokenAbC")
        );
        assert!(StreamTape::robot_link("<html></html>", "https").is_none());
    }

    #[tokio::test]
    async fn resolves_redirect_to_cdn() {
        let server = MockServer::start().await;
        let host = server.uri().trim_start_matches("http://").to_string();

        Mock::given(method("GET"))
            .and(path("/e/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(&host)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/get_video"))
            .and(query_param("token", "tokenAbC"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "https://cdn.example.com/v1.mp4"),
            )
            .mount(&server)
            .await;

        let strategy = StreamTape::new(Client::new())
            .expect("client should build")
            .with_hosts(["127.0.0.1"]);
        let link = IntermediaryLink {
            url: format!("{}/e/v1", server.uri()),
            referer_hint: String::new(),
        };
        let sink = CollectingSink::new();
        strategy
            .extract(&link, &ExtractContext::default(), &sink)
            .await
            .expect("extraction should succeed");

        assert_eq!(sink.streams()[0].url, "https://cdn.example.com/v1.mp4");
    }
}
