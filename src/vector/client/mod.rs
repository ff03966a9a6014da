
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::{VectorMetadata, VectorRecord};
use crate::config::VectorConfig;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Total attempts, not retries: the first try counts.
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store is not configured")]
    NotConfigured,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("vector store returned HTTP {0}")]
    Status(u16),

    #[error("invalid response from vector store: {0}")]
    InvalidResponse(String),

    #[error("request error: {0}")]
    Request(String),
}

impl VectorStoreError {
    /// Transient errors are worth retrying: transport failures and the
    /// throttling/server-side status codes. Everything else (auth, bad
    /// request, malformed response) fails immediately.
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::NotConfigured | Self::InvalidResponse(_) | Self::Request(_) => false,
        }
    }
}

/// Runs `operation` up to three times with exponential backoff and 0-10%
/// jitter, capped at one second per wait. Non-transient errors propagate
/// without a retry.
#[inline]
pub fn retry_with_backoff<T, F>(mut operation: F, context: &str) -> Result<T, VectorStoreError>
where
    F: FnMut() -> Result<T, VectorStoreError>,
{
    let mut last_error = None;
    for attempt in 0..MAX_ATTEMPTS {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_transient() {
                    warn!("{context} failed with permanent error: {error}");
                    return Err(error);
                }
                if attempt + 1 < MAX_ATTEMPTS {
                    let backoff = INITIAL_BACKOFF_MS << attempt;
                    let jitter = (backoff as f64 * 0.1 * rand::random::<f64>()) as u64;
                    let delay = Duration::from_millis((backoff + jitter).min(MAX_BACKOFF_MS));
                    warn!(
                        "{context} failed (attempt {}/{MAX_ATTEMPTS}), retrying in {delay:?}: {error}",
                        attempt + 1
                    );
                    std::thread::sleep(delay);
                }
                last_error = Some(error);
            }
        }
    }
    Err(last_error
        .unwrap_or_else(|| VectorStoreError::Request(format!("{context} produced no result"))))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryMode {
    Dense,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FusionAlgorithm {
    Rrf,
    Dbsf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub data: String,
    pub top_k: usize,
    pub include_metadata: bool,
    pub include_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub query_mode: QueryMode,
    pub fusion_algorithm: FusionAlgorithm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    result: DeleteResult,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct DeleteResult {
    deleted: usize,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    ids: &'a [String],
}

/// REST client for the remote vector index. The backend embeds raw text
/// server-side, so all operations exchange JSON over namespace-scoped
/// endpoints (`/upsert-data/{ns}`, `/query-data/{ns}`, ...).
///
/// An unconfigured client (missing URL or token) is a valid state: engines
/// check `is_configured()` and degrade to no-ops.
#[derive(Debug, Clone)]
pub struct VectorStoreClient {
    base_url: Option<Url>,
    token: Option<String>,
    agent: ureq::Agent,
}

impl VectorStoreClient {
    #[inline]
    pub fn new(config: &VectorConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Self {
            base_url: config.rest_url.clone(),
            token: config.rest_token.clone(),
            agent,
        }
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.token.as_deref().is_some_and(|token| !token.is_empty())
    }

    fn endpoint(&self, operation: &str, namespace: &str) -> Result<(Url, &str), VectorStoreError> {
        let base = self.base_url.as_ref().ok_or(VectorStoreError::NotConfigured)?;
        let token = self
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(VectorStoreError::NotConfigured)?;
        let url = base
            .join(&format!("{operation}/{namespace}"))
            .map_err(|e| VectorStoreError::Request(e.to_string()))?;
        Ok((url, token))
    }

    fn post_json(&self, url: &Url, token: &str, body: &str) -> Result<String, VectorStoreError> {
        self.agent
            .post(url.as_str())
            .header("Authorization", &format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut response| response.body_mut().read_to_string())
            .map_err(classify_transport_error)
    }

    /// Upserts records into `namespace`. Existing ids are overwritten, which
    /// is what makes repeated syncs idempotent.
    #[inline]
    pub fn upsert(
        &self,
        namespace: &str,
        records: &[VectorRecord],
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let (url, token) = self.endpoint("upsert-data", namespace)?;
        let body = serde_json::to_string(records)
            .map_err(|e| VectorStoreError::Request(e.to_string()))?;
        let context = format!("upsert of {} vector records", records.len());
        retry_with_backoff(|| self.post_json(&url, token, &body), &context)?;
        debug!("upserted {} vector records into '{namespace}'", records.len());
        Ok(())
    }

    #[inline]
    pub fn query(
        &self,
        namespace: &str,
        request: &QueryRequest,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let (url, token) = self.endpoint("query-data", namespace)?;
        let body = serde_json::to_string(request)
            .map_err(|e| VectorStoreError::Request(e.to_string()))?;
        let raw = retry_with_backoff(|| self.post_json(&url, token, &body), "vector query")?;
        let response: QueryResponse = serde_json::from_str(&raw)
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
        debug!(
            "vector query in '{namespace}' returned {} matches",
            response.result.len()
        );
        Ok(response.result)
    }

    /// Deletes ids from `namespace` and reports how many actually existed.
    #[inline]
    pub fn delete(&self, namespace: &str, ids: &[String]) -> Result<usize, VectorStoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let (url, token) = self.endpoint("delete", namespace)?;
        let body = serde_json::to_string(&DeleteBody { ids })
            .map_err(|e| VectorStoreError::Request(e.to_string()))?;
        let context = format!("delete of {} vector ids", ids.len());
        let raw = retry_with_backoff(|| self.post_json(&url, token, &body), &context)?;
        let response: DeleteResponse = serde_json::from_str(&raw)
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;
        Ok(response.result.deleted)
    }

    /// Drops every record in `namespace`.
    #[inline]
    pub fn reset(&self, namespace: &str) -> Result<(), VectorStoreError> {
        let (url, token) = self.endpoint("reset", namespace)?;
        retry_with_backoff(|| self.post_json(&url, token, "{}"), "namespace reset")?;
        debug!("reset vector namespace '{namespace}'");
        Ok(())
    }
}

fn classify_transport_error(error: ureq::Error) -> VectorStoreError {
    match error {
        ureq::Error::StatusCode(code) => VectorStoreError::Status(code),
        ureq::Error::ConnectionFailed | ureq::Error::HostNotFound | ureq::Error::Timeout(_) => {
            VectorStoreError::Transport(error.to_string())
        }
        ureq::Error::Io(e) => VectorStoreError::Transport(e.to_string()),
        other => VectorStoreError::Request(other.to_string()),
    }
}
