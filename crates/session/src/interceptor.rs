use std::sync::Arc;

use hianime_core::StreamDescriptor;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, Response};
use tracing::{debug, trace};

use crate::errors::{Result, SessionError};
use crate::store::{SessionStore, StreamFingerprint};

pub const SEGMENT_SUFFIX: &str = ".ts";
pub const SID_HEADER: &str = "sid";
pub const DEFAULT_BLACKLIST_MARKER: &str = "betterstream";

/// request hook installed for one delivered stream.
///
/// segment fetches get the stream's session id attached and trigger an
/// OPTIONS probe to the same url so the mirror keeps the session alive.
/// anything else passes through untouched.
#[derive(Debug, Clone)]
pub struct SegmentInterceptor {
    client: Client,
    store: Arc<SessionStore>,
    fingerprint: StreamFingerprint,
    blacklist_marker: String,
}

impl SegmentInterceptor {
    pub fn new(client: Client, store: Arc<SessionStore>, stream: &StreamDescriptor) -> Self {
        Self {
            client,
            store,
            fingerprint: StreamFingerprint::of(&stream.url),
            blacklist_marker: DEFAULT_BLACKLIST_MARKER.to_string(),
        }
    }

    pub fn with_blacklist_marker(mut self, marker: impl Into<String>) -> Self {
        self.blacklist_marker = marker.into();
        self
    }

    pub fn fingerprint(&self) -> StreamFingerprint {
        self.fingerprint
    }

    /// whether `request` is a segment fetch this hook acts on.
    pub fn applies_to(&self, request: &Request) -> bool {
        let url = request.url();
        url.path().ends_with(SEGMENT_SUFFIX)
            && request.method() != Method::OPTIONS
            && (self.blacklist_marker.is_empty() || !url.as_str().contains(&self.blacklist_marker))
    }

    /// rewrites `request` for sending. must run inside a tokio runtime for the
    /// probe to fire; without one only the header is applied.
    pub fn intercept(&self, mut request: Request) -> Request {
        if !self.applies_to(&request) {
            return request;
        }

        if let Some(sid) = self.store.get(self.fingerprint)
            && let Ok(value) = HeaderValue::from_str(&sid)
        {
            request
                .headers_mut()
                .insert(HeaderName::from_static(SID_HEADER), value);
        }

        self.fire_probe(&request);
        request
    }

    /// intercepts, sends, and records any session id the mirror hands back.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let applies = self.applies_to(&request);
        let request = self.intercept(request);
        let url = request.url().to_string();

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| SessionError::Request {
                context: format!("fetching {url}"),
                source,
            })?;

        if applies && response.status().is_success() {
            self.remember_sid(&response);
        }

        Ok(response)
    }

    fn remember_sid(&self, response: &Response) {
        if let Some(sid) = response
            .headers()
            .get(SID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            debug!(fingerprint = ?self.fingerprint, "recorded session id");
            self.store.record(self.fingerprint, sid);
        }
    }

    // detached; the probe's response and any error are discarded.
    fn fire_probe(&self, request: &Request) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            trace!("no runtime; skipping session probe");
            return;
        };

        let probe = self
            .client
            .request(Method::OPTIONS, request.url().clone())
            .headers(request.headers().clone());
        let url = request.url().to_string();

        handle.spawn(async move {
            if let Err(err) = probe.send().await {
                trace!(%url, error = %err, "session probe failed");
            }
        });
    }
}
