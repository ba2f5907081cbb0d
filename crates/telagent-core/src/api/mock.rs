//! In-memory API double for tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiError, MetricsApi};

/// Records every submission and fails on demand.
///
/// Failed calls are counted but their payloads are not recorded, so
/// `app_batches()` only ever contains what was accepted.
#[derive(Debug, Default)]
pub struct MockApi {
    failing: AtomicBool,
    latency: Duration,
    app_calls: AtomicUsize,
    server_calls: AtomicUsize,
    app_batches: Mutex<Vec<String>>,
    server_samples: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that rejects every submission.
    pub fn failing() -> Self {
        let api = Self::default();
        api.set_failing(true);
        api
    }

    /// Delays every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of app metric calls, including failed ones.
    pub fn app_calls(&self) -> usize {
        self.app_calls.load(Ordering::SeqCst)
    }

    /// Number of server metric calls, including failed ones.
    pub fn server_calls(&self) -> usize {
        self.server_calls.load(Ordering::SeqCst)
    }

    /// Accepted app metric batches, in call order.
    pub fn app_batches(&self) -> Vec<String> {
        self.app_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Accepted app metric payloads, batches split back into items.
    pub fn app_items(&self) -> Vec<String> {
        self.app_batches()
            .iter()
            .flat_map(|batch| batch.split('\n').map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Accepted server samples (JSON), in call order.
    pub fn server_samples(&self) -> Vec<String> {
        self.server_samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn respond(&self) -> Result<(), ApiError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(ApiError::Rejected("mock failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetricsApi for MockApi {
    async fn send_app_metrics(&self, batch: &str) -> Result<(), ApiError> {
        self.app_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        self.app_batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.to_string());
        Ok(())
    }

    async fn send_server_metrics(&self, sample: &str) -> Result<(), ApiError> {
        self.server_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        self.server_samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample.to_string());
        Ok(())
    }
}
