//! Transcript search: request validation, query building, region fallback with retry,
//! excerpting, and report formatting.

pub mod excerpt;
pub mod query;
pub mod record;
pub mod report;
pub mod request;
pub mod retry;
pub mod search;

pub use record::TranscriptRecord;
pub use request::SearchRequest;
pub use search::{SearchError, SearchOutcome, TranscriptSearcher};
