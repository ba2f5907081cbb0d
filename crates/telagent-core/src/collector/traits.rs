//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait allows the host collector to read the real `/proc`
//! on Linux and a [`MockFs`](super::MockFs) in tests.

use std::io;
use std::path::Path;

/// Space accounting of a mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    /// Space available to unprivileged users.
    pub available: u64,
}

impl DiskUsage {
    /// Used share of the space visible to unprivileged users:
    /// `used / (used + available) * 100`. Blocks reserved for root are
    /// excluded, matching what `df` reports.
    pub fn used_percentage(&self) -> f64 {
        let visible = self.used + self.available;
        if visible == 0 {
            return 0.0;
        }
        self.used as f64 / visible as f64 * 100.0
    }
}

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Returns space usage of the filesystem containing `path`.
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;
}

/// Real filesystem implementation that delegates to `std::fs` and `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
        let fragment = stat.fragment_size() as u64;
        let total = stat.blocks() as u64 * fragment;
        let free = stat.blocks_free() as u64 * fragment;
        let available = stat.blocks_available() as u64 * fragment;
        Ok(DiskUsage {
            total,
            used: total.saturating_sub(free),
            available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[test]
    fn test_real_fs_exists() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        assert!(fs.exists(&cargo_toml));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[test]
    fn test_real_fs_disk_usage() {
        let fs = RealFs::new();
        let dir = tempfile::tempdir().unwrap();
        let usage = fs.disk_usage(dir.path()).unwrap();
        assert!(usage.total > 0);
        assert!(usage.used <= usage.total);
        let pct = usage.used_percentage();
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn test_used_percentage_excludes_reserved_blocks() {
        // 100 total, 60 used, 30 available: 10 reserved for root.
        let usage = DiskUsage {
            total: 100,
            used: 60,
            available: 30,
        };
        assert!((usage.used_percentage() - 66.666).abs() < 0.01);
        assert_eq!(DiskUsage::default().used_percentage(), 0.0);
    }
}
