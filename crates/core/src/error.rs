use thiserror::Error;

/// Reasons an upstream entry cannot become a [`crate::Record`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    #[error("record has no issueNumber")]
    MissingIssueNumber,

    #[error("invalid issueNumber: {0}")]
    InvalidIssueNumber(String),
}
