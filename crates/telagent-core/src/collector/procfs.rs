//! Parsers for the `/proc` and `/etc` files the host collector reads.
//!
//! All parsers are pure functions over file contents so they can be tested
//! without a Linux host.

use crate::model::{OsInfo, ServerLoad};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Cumulative CPU time of the aggregate `cpu` line, in jiffies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    /// Sum of user, nice, system, idle, iowait, irq, softirq and steal.
    /// Guest time is already part of user time and is not added again.
    pub total: u64,
    /// Idle plus iowait.
    pub idle: u64,
}

impl CpuTimes {
    /// Busy percentage over the interval from `previous` to `self`.
    ///
    /// Passing `CpuTimes::default()` yields the average since boot.
    pub fn used_percentage_since(&self, previous: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(previous.total);
        let idle = self.idle.saturating_sub(previous.idle);
        if total == 0 {
            return 0.0;
        }
        total.saturating_sub(idle) as f64 / total as f64 * 100.0
    }
}

/// Parsed data from `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatInfo {
    pub cpu: CpuTimes,
    /// Number of `cpuN` lines (logical CPUs online).
    pub cpu_count: u32,
    /// Boot time, seconds since epoch.
    pub btime: u64,
}

/// Parses `/proc/stat`.
///
/// Fails if the aggregate `cpu` line is missing.
pub fn parse_stat(content: &str) -> Result<StatInfo, ParseError> {
    let mut stat = StatInfo::default();
    let mut found_aggregate = false;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&key) = parts.first() else {
            continue;
        };

        if key == "cpu" {
            let get_val =
                |idx: usize| -> u64 { parts.get(idx).and_then(|s| s.parse().ok()).unwrap_or(0) };
            let idle = get_val(4) + get_val(5);
            stat.cpu = CpuTimes {
                total: get_val(1) + get_val(2) + get_val(3) + idle + get_val(6) + get_val(7) + get_val(8),
                idle,
            };
            found_aggregate = true;
        } else if key
            .strip_prefix("cpu")
            .is_some_and(|id| id.parse::<u32>().is_ok())
        {
            stat.cpu_count += 1;
        } else if key == "btime" {
            stat.btime = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        }
    }

    if !found_aggregate {
        return Err(ParseError::new("missing aggregate cpu line in /proc/stat"));
    }
    Ok(stat)
}

/// Parsed data from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemInfo {
    pub total: u64,
    pub available: u64,
}

impl MemInfo {
    pub fn total_bytes(&self) -> u64 {
        self.total * 1024
    }

    /// `(total - available) / total * 100`.
    pub fn used_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.total.saturating_sub(self.available) as f64 / self.total as f64 * 100.0
    }
}

/// Parses `/proc/meminfo`.
///
/// Kernels older than 3.14 have no `MemAvailable`; it is then estimated as
/// free + buffers + cached.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let parse_kb = |line: &str| -> u64 {
        line.split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    };

    let mut total = None;
    let mut available = None;
    let (mut free, mut buffers, mut cached) = (0, 0, 0);

    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            total = Some(parse_kb(line));
        } else if line.starts_with("MemAvailable:") {
            available = Some(parse_kb(line));
        } else if line.starts_with("MemFree:") {
            free = parse_kb(line);
        } else if line.starts_with("Buffers:") {
            buffers = parse_kb(line);
        } else if line.starts_with("Cached:") {
            cached = parse_kb(line);
        }
    }

    let total = total.ok_or_else(|| ParseError::new("missing MemTotal in /proc/meminfo"))?;
    Ok(MemInfo {
        total,
        available: available.unwrap_or(free + buffers + cached).min(total),
    })
}

/// Parses the first three fields of `/proc/loadavg`.
pub fn parse_loadavg(content: &str) -> Result<ServerLoad, ParseError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(ParseError::new("invalid loadavg format"));
    }

    let load1 = parts[0]
        .parse()
        .map_err(|_| ParseError::new("invalid load1"))?;
    let load5 = parts[1]
        .parse()
        .map_err(|_| ParseError::new("invalid load5"))?;
    let load15 = parts[2]
        .parse()
        .map_err(|_| ParseError::new("invalid load15"))?;

    Ok(ServerLoad {
        load1,
        load5,
        load15,
    })
}

/// Parses `NAME` and `VERSION_ID` from `/etc/os-release`.
///
/// Returns `None` without a `NAME` entry. Values may be single- or
/// double-quoted.
pub fn parse_os_release(content: &str) -> Option<OsInfo> {
    let mut name = None;
    let mut version = String::new();

    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key {
            "NAME" => name = Some(value.to_string()),
            "VERSION_ID" => version = value.to_string(),
            _ => {}
        }
    }

    name.map(|name| OsInfo { name, version })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 20 30 800 50 0 0 0 10 0
cpu0 50 10 15 400 25 0 0 0 5 0
cpu1 50 10 15 400 25 0 0 0 5 0
intr 1000 0
ctxt 5000
btime 1700000000
processes 42
procs_running 1
procs_blocked 0
";

    #[test]
    fn test_parse_stat() {
        let stat = parse_stat(STAT).unwrap();
        assert_eq!(stat.cpu_count, 2);
        assert_eq!(stat.btime, 1700000000);
        // Guest (column 9) is not part of the total.
        assert_eq!(stat.cpu.total, 1000);
        assert_eq!(stat.cpu.idle, 850);
    }

    #[test]
    fn test_parse_stat_without_aggregate_line() {
        let err = parse_stat("cpu0 1 2 3 4\nbtime 1\n").unwrap_err();
        assert!(err.message.contains("aggregate cpu"));
    }

    #[test]
    fn test_cpu_percentage_since_previous() {
        let previous = CpuTimes {
            total: 1000,
            idle: 850,
        };
        let current = CpuTimes {
            total: 1200,
            idle: 900,
        };
        assert_eq!(current.used_percentage_since(&previous), 75.0);
        // Since boot.
        assert_eq!(previous.used_percentage_since(&CpuTimes::default()), 15.0);
        // No time elapsed.
        assert_eq!(current.used_percentage_since(&current), 0.0);
    }

    #[test]
    fn test_parse_meminfo() {
        let info = parse_meminfo(
            "MemTotal:       16000000 kB\nMemFree:         2000000 kB\nMemAvailable:    4000000 kB\n",
        )
        .unwrap();
        assert_eq!(info.total, 16_000_000);
        assert_eq!(info.available, 4_000_000);
        assert_eq!(info.total_bytes(), 16_384_000_000);
        assert_eq!(info.used_percentage(), 75.0);
    }

    #[test]
    fn test_parse_meminfo_estimates_available_on_old_kernels() {
        let info = parse_meminfo(
            "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\nSwapCached: 999 kB\n",
        )
        .unwrap();
        assert_eq!(info.available, 400);
        assert_eq!(info.used_percentage(), 60.0);
    }

    #[test]
    fn test_parse_meminfo_requires_total() {
        assert!(parse_meminfo("MemFree: 100 kB\n").is_err());
    }

    #[test]
    fn test_parse_loadavg() {
        let load = parse_loadavg("0.52 0.58 0.59 2/1234 56789\n").unwrap();
        assert_eq!(
            load,
            ServerLoad {
                load1: 0.52,
                load5: 0.58,
                load15: 0.59
            }
        );
        assert!(parse_loadavg("0.52 0.58").is_err());
        assert!(parse_loadavg("a b c").is_err());
    }

    #[test]
    fn test_parse_os_release() {
        let os = parse_os_release(
            "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nNAME=\"Debian GNU/Linux\"\nVERSION_ID=\"12\"\nID=debian\n",
        )
        .unwrap();
        assert_eq!(os.name, "Debian GNU/Linux");
        assert_eq!(os.version, "12");

        let os = parse_os_release("NAME=Arch\n").unwrap();
        assert_eq!(os.version, "");

        assert!(parse_os_release("ID=unknown\n").is_none());
    }
}
