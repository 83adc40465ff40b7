//! Persistent history store for collected game results.

pub mod error;
pub mod history;

pub use error::StoreError;
pub use history::{CorruptPolicy, HistoryDocument, HistoryStore, MergeResult};
