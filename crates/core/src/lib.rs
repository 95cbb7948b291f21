pub mod crypto;
pub mod direct;
pub mod errors;
pub mod extractor;
pub mod http;
pub mod key;
pub mod media;
pub mod megacloud;
pub mod packed;
pub mod streamtape;

pub use errors::{ExtractError, Result};
pub use extractor::{ExtractContext, Extractor, ExtractorChain};
pub use key::{DEFAULT_KEY_URL, KeyProvider};
pub use media::{
    CollectingSink, EmissionGuard, IntermediaryLink, MediaSink, StreamDescriptor, SubtitleTrack,
};
