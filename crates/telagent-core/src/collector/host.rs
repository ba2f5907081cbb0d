//! Host resource sampler backed by `/proc`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::procfs::{CpuTimes, parse_loadavg, parse_meminfo, parse_os_release, parse_stat};
use super::services::{ServiceSource, Systemctl};
use super::traits::FileSystem;
use super::CollectError;
use crate::model::ServerSample;
use crate::sampler::SampleSource;
use crate::util::is_container;

/// Where and what the host collector reads.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    /// Reported host name.
    pub hostname: String,
    /// Mount point of procfs.
    pub proc_path: PathBuf,
    /// Root under which `etc/os-release` and `var/run/reboot-required` live.
    pub root_path: PathBuf,
    /// Path whose filesystem usage is reported.
    pub disk_path: PathBuf,
    /// Collect the running systemd service inventory (ignored in containers).
    pub collect_services: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            proc_path: PathBuf::from("/proc"),
            root_path: PathBuf::from("/"),
            disk_path: PathBuf::from("/"),
            collect_services: false,
        }
    }
}

/// Produces [`ServerSample`]s from procfs.
///
/// Stateful: CPU usage is computed from the jiffies delta against the
/// previous sample. The first sample reports the average since boot.
pub struct HostCollector<F: FileSystem> {
    fs: F,
    config: HostConfig,
    previous_cpu: Option<CpuTimes>,
    services: Option<Box<dyn ServiceSource>>,
}

impl<F: FileSystem> HostCollector<F> {
    pub fn new(fs: F, config: HostConfig) -> Self {
        let services: Option<Box<dyn ServiceSource>> =
            if config.collect_services && !is_container() {
                Some(Box::new(Systemctl))
            } else {
                None
            };
        Self {
            fs,
            config,
            previous_cpu: None,
            services,
        }
    }

    /// Replaces the service inventory source.
    pub fn with_service_source(mut self, source: impl ServiceSource + 'static) -> Self {
        self.services = Some(Box::new(source));
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    #[cfg(test)]
    fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    fn read(&self, path: &Path) -> Result<String, CollectError> {
        self.fs
            .read_to_string(path)
            .map_err(|source| CollectError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Takes one sample stamped with `now`.
    pub fn collect_at(&mut self, now: DateTime<Utc>) -> Result<ServerSample, CollectError> {
        let proc_path = self.config.proc_path.clone();

        let stat = parse_stat(&self.read(&proc_path.join("stat"))?)?;
        let mem = parse_meminfo(&self.read(&proc_path.join("meminfo"))?)?;
        let load = parse_loadavg(&self.read(&proc_path.join("loadavg"))?)?;
        let disk = self
            .fs
            .disk_usage(&self.config.disk_path)
            .map_err(|source| CollectError::Io {
                path: self.config.disk_path.clone(),
                source,
            })?;

        let previous = self.previous_cpu.replace(stat.cpu).unwrap_or_default();

        let os_release = self.config.root_path.join("etc/os-release");
        let os = match self.fs.read_to_string(&os_release) {
            Ok(content) => parse_os_release(&content),
            Err(e) => {
                debug!(path = %os_release.display(), error = %e, "os-release not readable");
                None
            }
        };
        let reboot_required = self
            .fs
            .exists(&self.config.root_path.join("var/run/reboot-required"));

        let services = self.services.as_ref().and_then(|source| {
            source
                .running_services()
                .inspect_err(|e| warn!(error = %e, "failed to list services"))
                .ok()
        });

        Ok(ServerSample {
            hostname: self.config.hostname.clone(),
            cpu_used_percentage: stat.cpu.used_percentage_since(&previous),
            cpu_core_count: stat.cpu_count,
            load,
            memory_total: mem.total_bytes(),
            memory_used_percentage: mem.used_percentage(),
            disk_total: disk.total,
            disk_used_percentage: disk.used_percentage(),
            created_at: now,
            os,
            boot_time: stat.btime,
            reboot_required,
            services,
        })
    }
}

impl<F: FileSystem + 'static> SampleSource for HostCollector<F> {
    fn sample(&mut self) -> Result<ServerSample, CollectError> {
        self.collect_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::collector::MockFs;
    use crate::model::{OsInfo, ServerLoad, Service};

    struct FixedServices(Vec<Service>);

    impl ServiceSource for FixedServices {
        fn running_services(&self) -> Result<Vec<Service>, CollectError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenServices;

    impl ServiceSource for BrokenServices {
        fn running_services(&self) -> Result<Vec<Service>, CollectError> {
            Err(CollectError::Command("systemctl not found".into()))
        }
    }

    fn collector(fs: MockFs) -> HostCollector<MockFs> {
        HostCollector::new(
            fs,
            HostConfig {
                hostname: "web-1".into(),
                ..HostConfig::default()
            },
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap()
    }

    #[test]
    fn test_collect_typical_host() {
        let mut collector = collector(MockFs::typical_host());
        let sample = collector.collect_at(now()).unwrap();

        assert_eq!(sample.hostname, "web-1");
        assert_eq!(sample.created_at, now());
        // Since boot: 1500 busy of 10000.
        assert_eq!(sample.cpu_used_percentage, 15.0);
        assert_eq!(sample.cpu_core_count, 4);
        assert_eq!(
            sample.load,
            ServerLoad {
                load1: 0.5,
                load5: 0.75,
                load15: 1.25
            }
        );
        assert_eq!(sample.memory_total, 8 * 1024 * 1024 * 1024);
        assert_eq!(sample.memory_used_percentage, 75.0);
        assert_eq!(sample.disk_total, 100 * 1024 * 1024 * 1024);
        assert_eq!(sample.disk_used_percentage, 50.0);
        assert_eq!(sample.boot_time, 1714550400);
        assert_eq!(
            sample.os,
            Some(OsInfo {
                name: "Ubuntu".into(),
                version: "24.04".into()
            })
        );
        assert!(!sample.reboot_required);
        assert_eq!(sample.services, None);
    }

    #[test]
    fn test_cpu_usage_uses_delta_after_first_sample() {
        let mut collector = collector(MockFs::typical_host());
        collector.collect_at(now()).unwrap();

        collector
            .fs_mut()
            .add_file("/proc/stat", "cpu  1100 0 550 8300 550 0 0 0 0 0\ncpu0 1 1 1 1\nbtime 1714550400\n");
        let sample = collector.collect_at(now()).unwrap();
        // 500 jiffies elapsed, 350 of them idle or iowait.
        assert_eq!(sample.cpu_used_percentage, 30.0);
        assert_eq!(sample.cpu_core_count, 1);
    }

    #[test]
    fn test_reboot_required_flag() {
        let mut fs = MockFs::typical_host();
        fs.add_file("/var/run/reboot-required", "*** System restart required ***\n");
        let sample = collector(fs).collect_at(now()).unwrap();
        assert!(sample.reboot_required);
    }

    #[test]
    fn test_missing_os_release_is_not_fatal() {
        let mut fs = MockFs::typical_host();
        fs.remove_file("/etc/os-release");
        let sample = collector(fs).collect_at(now()).unwrap();
        assert_eq!(sample.os, None);
    }

    #[test]
    fn test_missing_proc_file_fails_sample() {
        let mut fs = MockFs::typical_host();
        fs.remove_file("/proc/meminfo");
        let err = collector(fs).collect_at(now()).unwrap_err();
        assert!(matches!(err, CollectError::Io { ref path, .. } if path == Path::new("/proc/meminfo")));
        assert!(err.to_string().starts_with("failed to read /proc/meminfo"));
    }

    #[test]
    fn test_malformed_proc_file_fails_sample() {
        let mut fs = MockFs::typical_host();
        fs.add_file("/proc/loadavg", "garbage\n");
        let err = collector(fs).collect_at(now()).unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));
    }

    #[test]
    fn test_custom_proc_path() {
        let mut fs = MockFs::new();
        let host = MockFs::typical_host();
        for name in ["stat", "meminfo", "loadavg"] {
            let content = host.read_to_string(&Path::new("/proc").join(name)).unwrap();
            fs.add_file(Path::new("/host/proc").join(name), content);
        }
        fs.set_disk_usage(host.disk_usage(Path::new("/")).unwrap());

        let mut collector = HostCollector::new(
            fs,
            HostConfig {
                proc_path: PathBuf::from("/host/proc"),
                ..HostConfig::default()
            },
        );
        assert_eq!(collector.collect_at(now()).unwrap().cpu_core_count, 4);
    }

    #[test]
    fn test_service_inventory() {
        let service = Service {
            name: "nginx".into(),
            description: "A high performance web server".into(),
            load_state: "loaded".into(),
            active_state: "active".into(),
            sub_state: "running".into(),
        };
        let mut collector = collector(MockFs::typical_host())
            .with_service_source(FixedServices(vec![service.clone()]));
        let sample = collector.collect_at(now()).unwrap();
        assert_eq!(sample.services, Some(vec![service]));
    }

    #[test]
    fn test_failed_service_listing_is_not_fatal() {
        let mut collector = collector(MockFs::typical_host()).with_service_source(BrokenServices);
        let sample = collector.collect_at(now()).unwrap();
        assert_eq!(sample.services, None);
    }
}
