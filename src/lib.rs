pub mod builder;
pub mod catalog;
pub mod client;
pub mod errors;
pub mod models;
pub mod servers;
pub mod sources;

pub use builder::*;
pub use client::*;
pub use errors::*;
pub use models::*;

pub use hianime_core::{
    CollectingSink, EmissionGuard, ExtractContext, Extractor, ExtractorChain, IntermediaryLink,
    MediaSink, StreamDescriptor, SubtitleTrack,
};
pub use hianime_session::{SegmentInterceptor, SessionStore, StreamFingerprint};
