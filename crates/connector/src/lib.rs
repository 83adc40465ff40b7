//! Upstream source client for the game result collector.

pub mod error;
pub mod source;

pub use error::FetchError;
pub use source::{parse_response, GameSource, HttpGameSource};
