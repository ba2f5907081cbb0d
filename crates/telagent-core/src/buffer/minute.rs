//! Minute-keyed buffer of host resource samples.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Timelike;
use tokio::sync::Notify;
use tracing::warn;

use crate::model::ServerSample;

/// Server samples grouped by the minute-of-hour (0-59) they were taken in.
///
/// A bucket only ever holds samples of one wall-clock minute: when the key
/// comes around again an hour later, whichever minute is older is evicted.
/// Samples of one minute stay in insertion order. A minute is otherwise
/// removed only by the sender, after its aggregate was delivered.
#[derive(Debug, Default)]
pub struct MinuteBuffer {
    minutes: Mutex<HashMap<u32, Vec<ServerSample>>>,
    added: Notify,
}

impl MinuteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Vec<ServerSample>>> {
        self.minutes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Buckets `sample` under its creation minute and signals the sender.
    ///
    /// Returns the number of samples evicted because they belonged to a
    /// different hour than `sample` for the same minute key.
    pub fn add(&self, sample: ServerSample) -> usize {
        let minute = sample.created_at.minute();
        let slot = minute_slot(&sample);
        let evicted = {
            let mut minutes = self.lock();
            let bucket = minutes.entry(minute).or_default();
            match bucket.first().map(minute_slot) {
                Some(held) if held < slot => {
                    let evicted = bucket.len();
                    bucket.clear();
                    bucket.push(sample);
                    evicted
                }
                // Clock stepped back over an hour: keep the newer minute.
                Some(held) if held > slot => 1,
                _ => {
                    bucket.push(sample);
                    0
                }
            }
        };
        if evicted > 0 {
            warn!(minute, evicted, "server samples from another hour evicted, never sent");
        }
        self.added.notify_one();
        evicted
    }

    /// Minute keys with pending samples, ascending.
    pub fn minutes(&self) -> Vec<u32> {
        let mut keys: Vec<u32> = self.lock().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Minute keys ordered by the timestamp of their oldest sample.
    ///
    /// Unlike `minutes()`, this keeps minute 59 ahead of minute 0 when the
    /// pending data spans an hour boundary.
    pub fn chronological_minutes(&self) -> Vec<u32> {
        let minutes = self.lock();
        let mut keys: Vec<(u32, chrono::DateTime<chrono::Utc>)> = minutes
            .iter()
            .filter_map(|(minute, samples)| samples.first().map(|s| (*minute, s.created_at)))
            .collect();
        keys.sort_by_key(|(minute, oldest)| (*oldest, *minute));
        keys.into_iter().map(|(minute, _)| minute).collect()
    }

    /// Key of the minute holding the newest sample, the one still filling.
    pub fn current_minute(&self) -> Option<u32> {
        self.lock()
            .iter()
            .filter_map(|(minute, samples)| samples.last().map(|s| (s.created_at, *minute)))
            .max()
            .map(|(_, minute)| minute)
    }

    /// Samples recorded for `minute`, oldest first. Empty if none.
    pub fn metrics(&self, minute: u32) -> Vec<ServerSample> {
        self.lock().get(&minute).cloned().unwrap_or_default()
    }

    /// Deletes `minute` with all its samples.
    pub fn remove(&self, minute: u32) {
        self.lock().remove(&minute);
    }

    /// Total number of buffered samples across all minutes.
    pub fn sample_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    /// Waits until at least one sample was added since the last wakeup.
    pub async fn added(&self) {
        self.added.notified().await;
    }
}

/// Minutes since the epoch; distinguishes 10:05 from 11:05.
fn minute_slot(sample: &ServerSample) -> i64 {
    sample.created_at.timestamp().div_euclid(60)
}
