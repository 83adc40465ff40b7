/// Failures of a single upstream fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream responded with status {0}")]
    HttpStatus(u16),

    #[error("malformed upstream body: {0}")]
    MalformedBody(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
