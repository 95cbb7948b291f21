use std::hash::{DefaultHasher, Hash, Hasher};

use dashmap::DashMap;

/// stable key for a stream, derived from its manifest url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFingerprint(u64);

impl StreamFingerprint {
    pub fn of(url: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// session ids observed on segment responses, keyed by stream.
///
/// one store is shared by every interceptor of a playback session. entries are
/// never evicted; a missing entry only means segment requests go out without
/// the header.
#[derive(Debug, Default)]
pub struct SessionStore {
    sids: DashMap<StreamFingerprint, String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: StreamFingerprint) -> Option<String> {
        self.sids.get(&fingerprint).map(|sid| sid.value().clone())
    }

    pub(crate) fn record(&self, fingerprint: StreamFingerprint, sid: impl Into<String>) {
        self.sids.insert(fingerprint, sid.into());
    }

    pub fn len(&self) -> usize {
        self.sids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sids.is_empty()
    }
}
