pub mod errors;
pub mod interceptor;
pub mod store;

pub use errors::{Result, SessionError};
pub use interceptor::{SEGMENT_SUFFIX, SID_HEADER, SegmentInterceptor};
pub use store::{SessionStore, StreamFingerprint};
