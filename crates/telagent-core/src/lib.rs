//! telagent-core: buffering and delivery pipeline of the telagent host agent.
//!
//! Provides:
//! - `buffer`: FIFO application metric buffer and minute-keyed sample buffer
//! - `ingest`: local Unix/TCP ingestion server (one connection = one submission)
//! - `collector`: `/proc` based host resource sampling behind a `FileSystem` trait
//! - `sampler`: interval driver feeding host samples into the minute buffer
//! - `sender`: flush policy: fill, idle, overflow and per-minute aggregation
//! - `api`: remote API capability trait with HTTP and mock implementations
//! - `model`: server sample types and per-minute aggregation
//! - `agent`: wiring of all of the above under one cancellation token
//! - `util`: helper utilities

pub mod agent;
pub mod api;
pub mod buffer;
pub mod collector;
pub mod ingest;
pub mod model;
pub mod sampler;
pub mod sender;
pub mod util;

/// Crate version with the short git SHA it was built from.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")");

/// Short git SHA embedded at build time.
pub const GIT_SHA: &str = env!("GIT_SHA");

/// Most recent git tag at build time, empty when untagged.
pub const GIT_TAG: &str = env!("GIT_TAG");
