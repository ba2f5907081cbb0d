//! Local ingestion of application metrics.
//!
//! Clients connect over a Unix domain socket or TCP, write one payload and
//! close the connection. The server trims the payload and hands it to a
//! handler, normally [`MetricBuffer::append`](crate::buffer::MetricBuffer::append).

mod address;
mod server;

pub use address::SocketAddress;
pub use server::{IngestOptions, IngestServer};

use std::io;

/// Error type for the ingest server.
#[derive(Debug)]
pub enum ServerError {
    /// The configured address is unusable.
    InvalidAddress(String),
    /// The listener could not be created.
    Bind { address: String, source: io::Error },
    /// Accepting a connection failed while the server was running.
    Accept(io::Error),
    /// The server was stopped with [`IngestServer::stop`].
    Stopped,
}

impl ServerError {
    /// Whether this is the expected result of a requested stop.
    pub fn is_stopped(&self) -> bool {
        matches!(self, ServerError::Stopped)
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidAddress(msg) => write!(f, "invalid socket address: {}", msg),
            ServerError::Bind { address, source } => {
                write!(f, "socket {} opening failed: {}", address, source)
            }
            ServerError::Accept(e) => write!(f, "failed to accept connection: {}", e),
            ServerError::Stopped => write!(f, "server stopped"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Accept(e) => Some(e),
            _ => None,
        }
    }
}
