use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

/// a playable stream handed to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// human readable name, e.g. `HiAnime HD-1 SUB`.
    pub label: String,
    /// manifest (or direct file) url.
    pub url: String,
    /// headers the player must send when fetching `url`.
    pub headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_referer(mut self, referer: &str) -> Self {
        if !referer.is_empty() {
            self.headers.insert("Referer".to_string(), referer.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub language: Option<String>,
    pub url: String,
}

/// a redirect-style link that has to go through an extractor before it plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediaryLink {
    pub url: String,
    pub referer_hint: String,
}

/// receiver for results produced during link resolution.
///
/// both callbacks fire while resolution is still running so a caller can start
/// playback on the first stream. delivery order across mirrors is unspecified.
pub trait MediaSink: Send + Sync {
    fn subtitle(&self, track: SubtitleTrack);
    fn stream(&self, stream: StreamDescriptor);
}

/// sink that stores everything it receives.
#[derive(Debug, Default)]
pub struct CollectingSink {
    streams: Mutex<Vec<StreamDescriptor>>,
    subtitles: Mutex<Vec<SubtitleTrack>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streams(&self) -> Vec<StreamDescriptor> {
        self.streams
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn subtitles(&self) -> Vec<SubtitleTrack> {
        self.subtitles
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl MediaSink for CollectingSink {
    fn subtitle(&self, track: SubtitleTrack) {
        if let Ok(mut subtitles) = self.subtitles.lock() {
            subtitles.push(track);
        }
    }

    fn stream(&self, stream: StreamDescriptor) {
        if let Ok(mut streams) = self.streams.lock() {
            streams.push(stream);
        }
    }
}

/// wraps the caller's sink at the emission boundary.
///
/// streams whose url contains the blacklist marker are dropped, whichever
/// strategy produced them. delivered streams are counted so the pipeline can
/// report whether anything playable came out.
pub struct EmissionGuard<'a> {
    inner: &'a dyn MediaSink,
    blacklist_marker: String,
    delivered: AtomicUsize,
}

impl<'a> EmissionGuard<'a> {
    pub fn new(inner: &'a dyn MediaSink, blacklist_marker: impl Into<String>) -> Self {
        Self {
            inner,
            blacklist_marker: blacklist_marker.into(),
            delivered: AtomicUsize::new(0),
        }
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        !self.blacklist_marker.is_empty() && url.contains(&self.blacklist_marker)
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl MediaSink for EmissionGuard<'_> {
    fn subtitle(&self, track: SubtitleTrack) {
        self.inner.subtitle(track);
    }

    fn stream(&self, stream: StreamDescriptor) {
        if self.is_blacklisted(&stream.url) {
            debug!(url = %stream.url, "dropping blacklisted stream");
            return;
        }

        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.inner.stream(stream);
    }
}

/// counts streams passed through to another sink without filtering.
pub(crate) struct CountingSink<'a> {
    inner: &'a dyn MediaSink,
    count: AtomicUsize,
}

impl<'a> CountingSink<'a> {
    pub(crate) fn new(inner: &'a dyn MediaSink) -> Self {
        Self {
            inner,
            count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl MediaSink for CountingSink<'_> {
    fn subtitle(&self, track: SubtitleTrack) {
        self.inner.subtitle(track);
    }

    fn stream(&self, stream: StreamDescriptor) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.inner.stream(stream);
    }
}
