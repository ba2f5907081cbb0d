//! Remote collection API.
//!
//! The sender depends only on the [`MetricsApi`] capability. [`HttpClient`]
//! talks to the real endpoint; [`mock::MockApi`] records calls for tests.

mod http;
pub mod mock;

pub use http::{ApiCredentials, HttpClient, interpret_response};

use async_trait::async_trait;

/// Error type for metric submission failures.
#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, TLS, ...).
    Http(reqwest::Error),
    /// Non-success HTTP status without a decodable response body.
    Status(u16),
    /// Response body could not be decoded.
    Decode(serde_json::Error),
    /// The endpoint answered but refused the submission.
    Rejected(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "HTTP error: {}", e),
            ApiError::Status(code) => write!(f, "unexpected HTTP status {}", code),
            ApiError::Decode(e) => write!(f, "invalid response body: {}", e),
            ApiError::Rejected(msg) => write!(f, "submission rejected: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            ApiError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Http(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e)
    }
}

/// Capability set of the remote collection endpoint.
///
/// Implementations must be cheap to share: the sender calls them from many
/// concurrent delivery tasks.
#[async_trait]
pub trait MetricsApi: Send + Sync + 'static {
    /// Submits a newline-joined batch of application metric payloads.
    async fn send_app_metrics(&self, batch: &str) -> Result<(), ApiError>;

    /// Submits one aggregated server sample as JSON.
    async fn send_server_metrics(&self, sample: &str) -> Result<(), ApiError>;
}
