//! In-memory metric buffers shared between producers and the sender.
//!
//! - [`MetricBuffer`] holds opaque application payloads in FIFO order.
//! - [`MinuteBuffer`] holds host samples grouped by minute until aggregated.
//!
//! Both own their lock and a coalescing notification used by the sender's
//! watch loops. Neither persists anything across restarts.

mod metric;
mod minute;

pub use metric::MetricBuffer;
pub use minute::MinuteBuffer;
