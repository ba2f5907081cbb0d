//! Fixed-interval host sampling into the minute buffer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::MinuteBuffer;
use crate::collector::CollectError;
use crate::model::ServerSample;

/// Anything that can produce one host sample on demand.
///
/// Called on the blocking pool; implementations may do file I/O.
pub trait SampleSource: Send + 'static {
    fn sample(&mut self) -> Result<ServerSample, CollectError>;
}

/// Drives a [`SampleSource`] on a fixed interval.
pub struct Sampler<S: SampleSource> {
    source: Arc<Mutex<S>>,
    buffer: Arc<MinuteBuffer>,
    interval: Duration,
}

impl<S: SampleSource> Sampler<S> {
    pub fn new(source: S, buffer: Arc<MinuteBuffer>, interval: Duration) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            buffer,
            interval,
        }
    }

    /// Spawns the sampling loop. The first sample is taken immediately.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Samples until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick.tick() => self.sample_once().await,
            }
        }
        debug!("sampler stopped");
    }

    async fn sample_once(&self) {
        let source = Arc::clone(&self.source);
        let result = tokio::task::spawn_blocking(move || {
            source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .sample()
        })
        .await;

        match result {
            Ok(Ok(sample)) => {
                debug!(
                    cpu = sample.cpu_used_percentage,
                    memory = sample.memory_used_percentage,
                    "host sample taken"
                );
                self.buffer.add(sample);
            }
            Ok(Err(e)) => warn!(error = %e, "failed to sample host resources"),
            Err(e) => error!(error = %e, "sampling task panicked"),
        }
    }
}
