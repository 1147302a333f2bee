//! Search domain - time-boxed requests to be matched with someone nearby.

pub mod models;
pub mod registry;

pub use models::{SearchRequest, SearchStatus};
pub use registry::{SearchRegistry, SearchSubmission};
