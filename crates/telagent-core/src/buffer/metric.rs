//! Thread-safe FIFO buffer of opaque application metric payloads.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Notify;

/// Ordered container of application metric payloads.
///
/// Insertion order is significant: `extract` and `discard` always operate on
/// the oldest items. All mutation happens under a single lock which is never
/// held across I/O, so producers are never blocked by delivery.
///
/// Every `append` raises a coalescing notification (a single stored permit),
/// so a burst of appends wakes a waiting consumer once instead of queueing
/// one wakeup per item.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    items: RwLock<VecDeque<String>>,
    appended: Notify,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer holding `items` in the given order.
    pub fn from_items(items: impl IntoIterator<Item = String>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().collect()),
            appended: Notify::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<String>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<String>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a payload to the tail and signals waiting consumers.
    pub fn append(&self, item: impl Into<String>) {
        self.write().push_back(item.into());
        self.appended.notify_one();
    }

    /// Returns the number of buffered payloads.
    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Atomically removes up to `limit` oldest payloads and returns them as
    /// an independent buffer. The remaining payloads keep their order.
    pub fn extract(&self, limit: usize) -> MetricBuffer {
        let mut items = self.write();
        let n = limit.min(items.len());
        let taken: VecDeque<String> = items.drain(..n).collect();
        MetricBuffer {
            items: RwLock::new(taken),
            appended: Notify::new(),
        }
    }

    /// Copies up to `limit` oldest payloads without removing them.
    pub fn peek(&self, limit: usize) -> MetricBuffer {
        let taken: VecDeque<String> = self.read().iter().take(limit).cloned().collect();
        MetricBuffer {
            items: RwLock::new(taken),
            appended: Notify::new(),
        }
    }

    /// Atomically drops the oldest `count` payloads without returning them.
    ///
    /// Clamped to the current size. Returns how many payloads were dropped.
    pub fn discard(&self, count: usize) -> usize {
        let mut items = self.write();
        let n = count.min(items.len());
        items.drain(..n);
        n
    }

    /// Appends all payloads of `other` to the tail of this buffer.
    ///
    /// Used to requeue a chunk whose delivery failed. Does not raise the
    /// append notification: requeued payloads go out with the next trigger.
    pub fn merge(&self, other: MetricBuffer) {
        let requeued = other.into_items();
        self.write().extend(requeued);
    }

    /// Returns a copy of the buffered payloads, oldest first.
    pub fn items(&self) -> Vec<String> {
        self.read().iter().cloned().collect()
    }

    /// Consumes the buffer, returning its payloads oldest first.
    pub fn into_items(self) -> Vec<String> {
        self.items
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into()
    }

    /// Joins the payloads with newlines into one batch body.
    pub fn payload(&self) -> String {
        let items = self.read();
        let mut out = String::with_capacity(items.iter().map(|s| s.len() + 1).sum());
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(item);
        }
        out
    }

    /// Waits until at least one `append` happened since the last wakeup.
    pub async fn appended(&self) {
        self.appended.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn numbered(range: std::ops::Range<usize>) -> MetricBuffer {
        let buffer = MetricBuffer::new();
        for i in range {
            buffer.append(i.to_string());
        }
        buffer
    }

    fn strings(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_append_and_count() {
        let buffer = numbered(0..5000);
        assert_eq!(buffer.count(), 5000);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_extract_preserves_order() {
        let buffer = numbered(0..100);
        let chunk = buffer.extract(30);

        assert_eq!(chunk.items(), strings(0..30));
        assert_eq!(buffer.items(), strings(30..100));
    }

    #[test]
    fn test_extract_clamps_to_size() {
        let buffer = numbered(0..100);
        let chunk = buffer.extract(110);
        assert_eq!(chunk.count(), 100);
        assert_eq!(buffer.count(), 0);

        let empty = MetricBuffer::new();
        let chunk = empty.extract(10);
        assert!(chunk.is_empty());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_peek_leaves_buffer_intact() {
        let buffer = numbered(0..5);
        assert_eq!(buffer.peek(3).items(), strings(0..3));
        assert_eq!(buffer.peek(10).count(), 5);
        assert_eq!(buffer.items(), strings(0..5));
    }

    #[test]
    fn test_merge_appends_to_tail() {
        let first = numbered(0..100);
        let second = numbered(100..250);
        first.merge(second);
        assert_eq!(first.count(), 250);
        assert_eq!(first.items(), strings(0..250));
    }

    #[test]
    fn test_requeued_chunk_lands_after_new_items() {
        let buffer = numbered(0..10);
        let chunk = buffer.extract(4);
        buffer.append("late");
        buffer.merge(chunk);

        let mut expected = strings(4..10);
        expected.push("late".to_string());
        expected.extend(strings(0..4));
        assert_eq!(buffer.items(), expected);
    }

    #[test]
    fn test_conservation_across_extract_and_merge() {
        let buffer = numbered(0..500);
        let a = buffer.extract(120);
        let b = buffer.extract(80);
        buffer.merge(a);
        // `b` is the only chunk still detached.
        assert_eq!(buffer.count(), 500 - b.count());
    }

    #[test]
    fn test_discard() {
        let buffer = numbered(0..100);
        assert_eq!(buffer.discard(100), 100);
        assert_eq!(buffer.count(), 0);

        let buffer = numbered(0..100);
        assert_eq!(buffer.discard(200), 100);
        assert_eq!(buffer.count(), 0);

        let buffer = numbered(0..100);
        buffer.discard(40);
        assert_eq!(buffer.count(), 60);

        let buffer = numbered(0..120);
        buffer.discard(40);
        assert_eq!(buffer.count(), 80);
        assert_eq!(buffer.payload(), numbered(40..120).payload());
    }

    #[test]
    fn test_payload_joins_with_newlines() {
        let buffer = MetricBuffer::from_items(["a".to_string(), "b".into(), "c".into()]);
        assert_eq!(buffer.payload(), "a\nb\nc");
        assert_eq!(MetricBuffer::new().payload(), "");
    }

    #[test]
    fn test_concurrent_append_and_extract_neither_loses_nor_duplicates() {
        let buffer = Arc::new(MetricBuffer::new());
        let mut writers = Vec::new();
        for w in 0..4 {
            let buffer = Arc::clone(&buffer);
            writers.push(thread::spawn(move || {
                for i in 0..1000 {
                    buffer.append(format!("{w}-{i}"));
                }
            }));
        }

        let reader = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    seen.extend(buffer.extract(17).into_items());
                }
                seen
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        let mut all = reader.join().unwrap();
        all.extend(buffer.extract(usize::MAX).into_items());

        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len());
        assert_eq!(all.len(), 4000);
    }

    #[tokio::test]
    async fn test_append_notifications_coalesce() {
        let buffer = MetricBuffer::new();
        for i in 0..100 {
            buffer.append(i.to_string());
        }

        // One stored permit, regardless of how many appends happened.
        tokio::time::timeout(Duration::from_millis(50), buffer.appended())
            .await
            .expect("first wakeup is immediate");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), buffer.appended())
                .await
                .is_err()
        );
    }
}
