//! Flush policy for buffered metrics.
//!
//! App metrics leave the buffer through three independent loops:
//! - fill: a full chunk is waiting
//! - idle: nothing was delivered for `idle_interval`
//! - overflow: the buffer exceeds its ceiling and the oldest excess is dropped
//!
//! Server samples are aggregated per completed minute and sent in
//! chronological order. Every loop stops on the sender's cancellation token.

mod config;

pub use config::{ConfigError, DeliveryConfig};

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::api::MetricsApi;
use crate::buffer::{MetricBuffer, MinuteBuffer};
use crate::model::aggregate;

/// Moves buffered metrics to the remote API.
pub struct Sender<A: MetricsApi> {
    api: Arc<A>,
    app_buffer: Arc<MetricBuffer>,
    server_buffer: Arc<MinuteBuffer>,
    config: DeliveryConfig,
    cancel: CancellationToken,
    deliveries: TaskTracker,
    /// Time of the last confirmed app metric delivery.
    sent_at: Mutex<Instant>,
}

impl<A: MetricsApi> Sender<A> {
    pub fn new(
        api: Arc<A>,
        app_buffer: Arc<MetricBuffer>,
        server_buffer: Arc<MinuteBuffer>,
        config: DeliveryConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            app_buffer,
            server_buffer,
            config,
            cancel,
            deliveries: TaskTracker::new(),
            sent_at: Mutex::new(Instant::now()),
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Instant of the last successful app metric delivery (construction time
    /// until the first one).
    pub fn last_sent(&self) -> Instant {
        *self.sent_at.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_sent(&self) {
        *self.sent_at.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Spawns the fill, idle and overflow loops.
    pub fn spawn_app_loops(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(self).fill_loop()),
            tokio::spawn(Arc::clone(self).idle_loop()),
            tokio::spawn(Arc::clone(self).overflow_loop()),
        ]
    }

    /// Spawns the per-minute aggregation loop.
    pub fn spawn_server_loop(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).minute_loop())
    }

    async fn fill_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.app_buffer.appended() => {
                    while self.app_buffer.count() >= self.config.fill_threshold {
                        self.flush_app_chunk();
                    }
                }
            }
        }
        debug!("fill loop stopped");
    }

    async fn idle_loop(self: Arc<Self>) {
        let mut tick = tokio::time::interval(self.config.idle_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {
                    if !self.app_buffer.is_empty()
                        && self.last_sent().elapsed() > self.config.idle_interval
                    {
                        debug!(
                            pending = self.app_buffer.count(),
                            "idle interval elapsed, flushing partial chunk"
                        );
                        self.flush_app_chunk();
                    }
                }
            }
        }
        debug!("idle loop stopped");
    }

    async fn overflow_loop(self: Arc<Self>) {
        let mut tick = tokio::time::interval(self.config.overflow_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => self.enforce_ceiling(),
            }
        }
        debug!("overflow loop stopped");
    }

    fn enforce_ceiling(&self) {
        let count = self.app_buffer.count();
        if count <= self.config.overflow_ceiling {
            return;
        }
        let dropped = self.app_buffer.discard(count - self.config.overflow_ceiling);
        warn!(
            dropped,
            ceiling = self.config.overflow_ceiling,
            "app metric buffer over ceiling, discarded oldest metrics"
        );
    }

    /// Detaches up to one chunk and delivers it in its own task.
    fn flush_app_chunk(self: &Arc<Self>) {
        let chunk = self.app_buffer.extract(self.config.fill_threshold);
        let sender = Arc::clone(self);
        self.deliveries.spawn(async move { sender.deliver(chunk).await });
    }

    /// Sends one chunk; on failure requeues it after the retry backoff.
    ///
    /// Returns whether the chunk was accepted.
    async fn deliver(&self, chunk: MetricBuffer) -> bool {
        if chunk.is_empty() {
            error!("refusing to deliver an empty app metric chunk");
            return false;
        }

        let count = chunk.count();
        match self.api.send_app_metrics(&chunk.payload()).await {
            Ok(()) => {
                self.mark_sent();
                debug!(count, "app metrics delivered");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    count,
                    backoff_ms = self.config.retry_backoff.as_millis() as u64,
                    "failed to send app metrics, requeueing"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_backoff) => {}
                    _ = self.cancel.cancelled() => {}
                }
                self.app_buffer.merge(chunk);
                false
            }
        }
    }

    async fn minute_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.server_buffer.added() => {
                    self.flush_server_metrics().await;
                }
            }
        }
        debug!("minute loop stopped");
    }

    /// Aggregates and sends every completed minute, oldest first.
    ///
    /// The minute holding the newest sample is in progress and is never
    /// sent. The pass stops at the first failed send or once the sender is
    /// cancelled. Returns the number of minutes sent.
    pub async fn flush_server_metrics(&self) -> usize {
        let mut sent = 0;
        while !self.cancel.is_cancelled() {
            let Some(current) = self.server_buffer.current_minute() else {
                break;
            };
            let Some(minute) = self
                .server_buffer
                .chronological_minutes()
                .into_iter()
                .find(|minute| *minute != current)
            else {
                break;
            };

            let Some(sample) = aggregate(&self.server_buffer.metrics(minute)) else {
                self.server_buffer.remove(minute);
                continue;
            };
            let body = match sample.to_json() {
                Ok(body) => body,
                Err(e) => {
                    error!(minute, error = %e, "failed to encode server sample, dropping minute");
                    self.server_buffer.remove(minute);
                    continue;
                }
            };

            match self.api.send_server_metrics(&body).await {
                Ok(()) => {
                    self.server_buffer.remove(minute);
                    sent += 1;
                    debug!(minute, "server metrics delivered");
                }
                Err(e) => {
                    warn!(minute, error = %e, "failed to send server metrics");
                    break;
                }
            }
        }
        sent
    }

    /// Final best-effort flush of the app buffer.
    ///
    /// Meant to run after the token is cancelled and the loops have returned.
    /// Waits for in-flight deliveries (failed ones requeue immediately once
    /// cancelled), then sends what is left in chunks without retrying. A
    /// chunk leaves the buffer only after it was accepted, so a failure or
    /// the `drain_timeout` leaves every undelivered item counted as lost.
    /// Returns the number of items delivered.
    pub async fn drain(&self) -> usize {
        let mut delivered = 0;
        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            self.deliveries.close();
            self.deliveries.wait().await;

            while !self.app_buffer.is_empty() {
                let chunk = self.app_buffer.peek(self.config.fill_threshold);
                let count = chunk.count();
                if let Err(e) = self.api.send_app_metrics(&chunk.payload()).await {
                    warn!(error = %e, count, "drain delivery failed");
                    return;
                }
                self.app_buffer.discard(count);
                delivered += count;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "drain timed out"
            );
        }
        let lost = self.app_buffer.count();
        if lost > 0 {
            warn!(lost, "app metrics left undelivered at shutdown");
        }
        info!(delivered, "app metric buffer drained");
        delivered
    }
}
