//! Shared model and configuration for the game result collector.

pub mod config;
pub mod error;
pub mod record;

pub use config::Config;
pub use error::*;
pub use record::{IssueKey, Record, ISSUE_NUMBER_FIELD};
