//! HTTP implementation of the remote collection API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::trace;

use super::{ApiError, MetricsApi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const APP_METRICS_PATH: &str = "v1/agent/app/metrics";
const SERVER_METRICS_PATH: &str = "v1/agent/server/metrics";

/// Identity and endpoint of the agent towards the remote API.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    /// Base URL, with or without trailing slash.
    pub url: String,
    pub environment: String,
    pub app_id: String,
    pub app_key: String,
    pub hostname: String,
    /// Whether the agent runs inside a container.
    pub in_container: bool,
}

/// Response envelope returned by the collection endpoint.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    success: bool,
    #[serde(default)]
    message: String,
}

/// Remote API client over HTTP(S).
pub struct HttpClient {
    client: reqwest::Client,
    credentials: ApiCredentials,
    base_url: String,
}

impl HttpClient {
    /// Creates a client with the agent's default headers and a 10s timeout.
    pub fn new(credentials: ApiCredentials) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("telagent/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or_else(|_| HeaderValue::from_static("telagent")),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-agent-in-container",
            HeaderValue::from_static(if credentials.in_container { "true" } else { "false" }),
        );
        if let Ok(env) = HeaderValue::from_str(&credentials.environment) {
            headers.insert("x-agent-environment", env);
        }
        if let Ok(host) = HeaderValue::from_str(&credentials.hostname) {
            headers.insert("x-agent-hostname", host);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;
        let base_url = credentials.url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            credentials,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: &str) -> Result<(), ApiError> {
        let url = self.endpoint(path);
        trace!(url = %url, bytes = body.len(), "posting metrics");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.app_id, Some(&self.credentials.app_key))
            .body(body.to_owned())
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        interpret_response(status, &text)
    }
}

#[async_trait]
impl MetricsApi for HttpClient {
    async fn send_app_metrics(&self, batch: &str) -> Result<(), ApiError> {
        self.post(APP_METRICS_PATH, batch).await
    }

    async fn send_server_metrics(&self, sample: &str) -> Result<(), ApiError> {
        self.post(SERVER_METRICS_PATH, sample).await
    }
}

/// Maps an HTTP status and body to the outcome of a submission.
///
/// The body is authoritative when it decodes: `success: false` is a rejection
/// even on a 2xx status. An undecodable body is a status error on non-2xx and
/// a decode error otherwise.
pub fn interpret_response(status: u16, body: &str) -> Result<(), ApiError> {
    match serde_json::from_str::<ApiResponse>(body) {
        Ok(resp) if resp.success => Ok(()),
        Ok(resp) => Err(ApiError::Rejected(resp.message)),
        Err(_) if !(200..300).contains(&status) => Err(ApiError::Status(status)),
        Err(e) => Err(ApiError::Decode(e)),
    }
}
