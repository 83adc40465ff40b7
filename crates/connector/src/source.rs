//! Upstream game-result API client.
//!
//! One call to [`GameSource::fetch_latest`] is one POST to the list endpoint.
//! Retrying is the caller's business: the collection cycle simply tries again
//! on its next tick.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use collector_core::config::SourceConfig;
use collector_core::Record;

use crate::error::FetchError;

/// Anything that can produce the latest batch of candidate records.
#[async_trait]
pub trait GameSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<Record>, FetchError>;

    /// Human-readable name for logs (e.g. the endpoint URL).
    fn name(&self) -> &str;
}

/// Request body expected by the upstream list endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    page_size: u32,
    page_no: u32,
    type_id: u32,
    language: u32,
    random: &'a str,
    signature: &'a str,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    list: Option<Vec<Value>>,
}

/// [`GameSource`] backed by the upstream HTTP API.
pub struct HttpGameSource {
    client: reqwest::Client,
    config: SourceConfig,
}

impl HttpGameSource {
    /// Build the client once; the request timeout comes from `config.timeout_secs`.
    pub fn new(config: SourceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, config })
    }

    fn request_body(&self, timestamp: i64) -> ListRequest<'_> {
        ListRequest {
            page_size: self.config.page_size,
            page_no: self.config.page_no,
            type_id: self.config.type_id,
            language: self.config.language,
            random: &self.config.random,
            signature: &self.config.signature,
            timestamp,
        }
    }
}

#[async_trait]
impl GameSource for HttpGameSource {
    async fn fetch_latest(&self) -> Result<Vec<Record>, FetchError> {
        let body = self.request_body(Utc::now().timestamp());
        debug!(url = %self.config.url, page_size = body.page_size, "fetching latest results");

        let response = self.client.post(&self.config.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let text = response.text().await?;
        parse_response(&text)
    }

    fn name(&self) -> &str {
        &self.config.url
    }
}

/// Parse an upstream body shaped `{ "data": { "list": [ ... ] } }`.
///
/// Individually invalid entries are skipped with a warning; the body is
/// rejected only when it has no usable record at all.
pub fn parse_response(body: &str) -> Result<Vec<Record>, FetchError> {
    let parsed: ListResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::MalformedBody(format!("invalid JSON: {e}")))?;

    let list = parsed
        .data
        .and_then(|d| d.list)
        .filter(|list| !list.is_empty())
        .ok_or_else(|| FetchError::MalformedBody("response has no data.list entries".to_string()))?;

    let total = list.len();
    let mut records = Vec::with_capacity(total);
    for (index, entry) in list.into_iter().enumerate() {
        match Record::try_from(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!(index, error = %e, "skipping malformed upstream entry"),
        }
    }

    if records.is_empty() {
        return Err(FetchError::MalformedBody(format!(
            "none of the {total} list entries is a valid record"
        )));
    }
    Ok(records)
}
