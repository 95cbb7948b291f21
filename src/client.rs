use std::sync::Arc;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client as ReqwestClient, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use hianime_core::http::build_client;
use hianime_core::{ExtractorChain, KeyProvider, StreamDescriptor};
use hianime_session::{SegmentInterceptor, SessionStore};

use crate::builder::HianimeBuilder;
use crate::errors::{HianimeError, Result};

/// `{status, html}` wrapper used by the site's ajax endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct HtmlEnvelope {
    #[serde(default)]
    pub html: String,
}

pub struct HianimeClient {
    pub(crate) base_url: String,
    pub(crate) api_url: String,
    pub(crate) referer_hint: String,
    pub(crate) blacklist_marker: String,
    pub(crate) provider_name: String,
    pub(crate) client: ReqwestClient,
    pub(crate) keys: KeyProvider,
    pub(crate) generic: ExtractorChain,
    pub(crate) legacy: ExtractorChain,
}

impl HianimeClient {
    pub(crate) fn from_builder(builder: HianimeBuilder) -> Result<Self> {
        Url::parse(&builder.base_url).map_err(|_| HianimeError::BaseUrl {
            url: builder.base_url.clone(),
        })?;
        Url::parse(&builder.api_url).map_err(|_| HianimeError::BaseUrl {
            url: builder.api_url.clone(),
        })?;

        let client = build_client()?;

        let generic = match builder.generic {
            Some(chain) => chain,
            None => ExtractorChain::generic(client.clone())?,
        };
        let legacy = match builder.legacy {
            Some(chain) => chain,
            None => ExtractorChain::legacy(client.clone()),
        };

        Ok(Self {
            keys: KeyProvider::new(client.clone(), builder.key_url),
            base_url: builder.base_url,
            api_url: builder.api_url,
            referer_hint: builder.referer_hint,
            blacklist_marker: builder.blacklist_marker,
            provider_name: builder.provider_name,
            client,
            generic,
            legacy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// request hook for a stream delivered by this client. pass the same
    /// `store` to every hook of one playback session.
    pub fn interceptor_for(
        &self,
        stream: &StreamDescriptor,
        store: Arc<SessionStore>,
    ) -> SegmentInterceptor {
        SegmentInterceptor::new(self.client.clone(), store, stream)
            .with_blacklist_marker(self.blacklist_marker.clone())
    }

    fn headers(&self, referer: &str, is_ajax: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(if is_ajax {
                "application/json, text/javascript, */*; q=0.01"
            } else {
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
            }),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        if is_ajax {
            headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        }

        if let Ok(v) = HeaderValue::from_str(referer) {
            headers.insert(REFERER, v);
        }

        headers
    }

    /// absolute url for a site-relative `href`.
    pub(crate) fn absolute(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        if let Some(rest) = href.strip_prefix("//") {
            return format!("https://{rest}");
        }
        Url::parse(&self.base_url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}/{}", self.base_url, href.trim_start_matches('/')))
    }

    async fn ensure_success(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());

        Err(HianimeError::HttpStatus {
            context: context.to_string(),
            status,
            body,
        })
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, &str)],
        is_ajax: bool,
        context: &str,
    ) -> Result<reqwest::Response> {
        let referer = format!("{}/", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(query)
            .headers(self.headers(&referer, is_ajax))
            .send()
            .await
            .map_err(|source| HianimeError::Request {
                context: context.to_string(),
                source,
            })?;

        Self::ensure_success(resp, context).await
    }

    pub(crate) async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<String> {
        self.send(url, query, false, context)
            .await?
            .text()
            .await
            .map_err(|source| HianimeError::ResponseBody {
                context: context.to_string(),
                source,
            })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T> {
        self.send(url, query, true, context)
            .await?
            .json::<T>()
            .await
            .map_err(|source| HianimeError::Json {
                context: context.to_string(),
                source,
            })
    }
}
