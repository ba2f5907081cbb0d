//! Server sample data model and per-minute aggregation.

mod aggregate;
mod sample;

pub use aggregate::aggregate;
pub use sample::{OsInfo, ServerLoad, ServerSample, Service, format_timestamp};
