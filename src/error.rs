//! Typed errors for fetching, configuration, and the pipeline run.
//!
//! Only [`PipelineError`] ever reaches the caller of
//! [`Pipeline::run`](crate::pipeline::Pipeline::run). Fetch errors are
//! absorbed by the pipeline: a failed list page truncates that source's
//! listing and a failed enrichment leaves the article as it was.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited (HTTP 429) by {url}")]
    RateLimited { url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("gave up on {url} after {retries} retries: {last}")]
    RetriesExhausted {
        url: String,
        retries: u32,
        #[source]
        last: Box<FetchError>,
    },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("concurrency limiter closed")]
    LimiterClosed,
}

impl FetchError {
    /// Rate limiting and timeouts are the only conditions worth another attempt.
    pub fn is_retriable(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. } | FetchError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field} in source {source_id}: {reason}")]
    Invalid {
        source_id: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid base URL for {source_id}: {reason}")]
    BaseUrl { source_id: String, reason: String },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to persist snapshot to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read snapshot {path}: {source}")]
    ReadSnapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
