use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};

use crate::errors::{ExtractError, Result};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// builds the shared client used by extractors.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|source| ExtractError::BuildClient {
            context: "building reqwest client",
            source,
        })
}

/// builds a client that hands redirects back instead of following them.
pub fn build_no_redirect_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::none())
        .build()
        .map_err(|source| ExtractError::BuildClient {
            context: "building no-redirect client",
            source,
        })
}

pub(crate) async fn ensure_success(response: Response, context: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    Err(ExtractError::HttpStatus {
        context: context.to_string(),
        status,
        body,
    })
}

pub(crate) async fn get_text(client: &Client, url: &str, referer: &str) -> Result<String> {
    let mut req = client.get(url);
    if !referer.is_empty() {
        req = req.header(reqwest::header::REFERER, referer);
    }

    let resp = req.send().await.map_err(|source| ExtractError::Request {
        context: format!("loading {url}"),
        source,
    })?;
    let resp = ensure_success(resp, url).await?;

    resp.text()
        .await
        .map_err(|source| ExtractError::ResponseBody {
            context: format!("reading body of {url}"),
            source,
        })
}

pub(crate) fn origin_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let scheme = parsed.scheme();
    match parsed.port() {
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

/// true when `host` equals a pattern or sits on one of its subdomains, or when
/// the pattern is a bare name (`megacloud`) contained in a host label.
pub(crate) fn host_matches(host: &str, patterns: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern.contains('.') || pattern.contains(':') {
            host == pattern || host.ends_with(&format!(".{pattern}"))
        } else {
            host.split('.').any(|label| label == pattern)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn bare_pattern_matches_any_tld() {
        let p = patterns(&["megacloud"]);
        assert!(host_matches("megacloud.blog", &p));
        assert!(host_matches("www.megacloud.tv", &p));
        assert!(!host_matches("notmegacloud.tv", &p));
    }

    #[test]
    fn dotted_pattern_matches_host_and_subdomains() {
        let p = patterns(&["rapid-cloud.co"]);
        assert!(host_matches("rapid-cloud.co", &p));
        assert!(host_matches("cdn.rapid-cloud.co", &p));
        assert!(!host_matches("rapid-cloud.ru", &p));
    }

    #[test]
    fn origin_keeps_explicit_port() {
        assert_eq!(
            origin_from_url("http://127.0.0.1:8080/e/abc").as_deref(),
            Some("http://127.0.0.1:8080")
        );
        assert_eq!(
            origin_from_url("https://kwik.si/e/abc").as_deref(),
            Some("https://kwik.si")
        );
    }
}
