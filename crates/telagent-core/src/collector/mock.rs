//! In-memory mock filesystem for testing the collector without real `/proc`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use super::traits::{DiskUsage, FileSystem};

/// In-memory filesystem for testing.
///
/// Files are keyed by absolute path. Disk usage is one fixed value for
/// every path; a missing value makes `disk_usage` fail like an unmounted
/// path would.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    disk: Option<DiskUsage>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file with the given content.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files.insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    pub fn set_disk_usage(&mut self, usage: DiskUsage) {
        self.disk = Some(usage);
    }

    /// A host with 4 CPUs, 8 GiB of memory and a half-full 100 GiB disk.
    pub fn typical_host() -> Self {
        let mut fs = Self::new();
        fs.add_file(
            "/proc/stat",
            "cpu  1000 0 500 8000 500 0 0 0 0 0\n\
             cpu0 250 0 125 2000 125 0 0 0 0 0\n\
             cpu1 250 0 125 2000 125 0 0 0 0 0\n\
             cpu2 250 0 125 2000 125 0 0 0 0 0\n\
             cpu3 250 0 125 2000 125 0 0 0 0 0\n\
             intr 12345 0 0\n\
             ctxt 987654\n\
             btime 1714550400\n\
             processes 4321\n\
             procs_running 2\n\
             procs_blocked 0\n",
        );
        fs.add_file(
            "/proc/meminfo",
            "MemTotal:        8388608 kB\n\
             MemFree:         1048576 kB\n\
             MemAvailable:    2097152 kB\n\
             Buffers:          262144 kB\n\
             Cached:          1048576 kB\n",
        );
        fs.add_file("/proc/loadavg", "0.50 0.75 1.25 2/345 6789\n");
        fs.add_file(
            "/etc/os-release",
            "NAME=\"Ubuntu\"\nVERSION=\"24.04 LTS (Noble Numbat)\"\nID=ubuntu\nVERSION_ID=\"24.04\"\n",
        );
        let gib = 1024 * 1024 * 1024;
        fs.set_disk_usage(DiskUsage {
            total: 100 * gib,
            used: 50 * gib,
            available: 50 * gib,
        });
        fs
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        self.disk.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no filesystem mounted at {}", path.display()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_and_read_file() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/loadavg", "0.1 0.2 0.3 1/2 3");
        assert!(fs.exists(Path::new("/proc/loadavg")));
        assert_eq!(
            fs.read_to_string(Path::new("/proc/loadavg")).unwrap(),
            "0.1 0.2 0.3 1/2 3"
        );

        fs.remove_file("/proc/loadavg");
        let err = fs.read_to_string(Path::new("/proc/loadavg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_mock_fs_disk_usage() {
        let fs = MockFs::new();
        assert!(fs.disk_usage(Path::new("/")).is_err());

        let fs = MockFs::typical_host();
        let usage = fs.disk_usage(Path::new("/")).unwrap();
        assert_eq!(usage.used_percentage(), 50.0);
    }
}
