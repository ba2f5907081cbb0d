//! Host resource collection.
//!
//! [`HostCollector`] reads `/proc`, `/etc/os-release` and filesystem usage
//! through the [`FileSystem`] trait so it can be exercised against
//! [`MockFs`] in tests. Parsers live in [`procfs`] and [`services`].

mod host;
mod mock;
pub mod procfs;
pub mod services;
mod traits;

pub use host::{HostCollector, HostConfig};
pub use mock::MockFs;
pub use procfs::ParseError;
pub use services::{ServiceSource, Systemctl};
pub use traits::{DiskUsage, FileSystem, RealFs};

use std::io;
use std::path::PathBuf;

/// Error type for a failed host sample.
#[derive(Debug)]
pub enum CollectError {
    /// A source file or filesystem could not be read.
    Io { path: PathBuf, source: io::Error },
    /// A source file had unexpected content.
    Parse(ParseError),
    /// An external command failed.
    Command(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            CollectError::Parse(e) => write!(f, "{}", e),
            CollectError::Command(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io { source, .. } => Some(source),
            CollectError::Parse(e) => Some(e),
            CollectError::Command(_) => None,
        }
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e)
    }
}
