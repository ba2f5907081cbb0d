//! Host resource samples produced by the sampler and sent per minute.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// System load averages.
///
/// Source: `/proc/loadavg` fields 1-3.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ServerLoad {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// Operating system identification.
///
/// Source: `/etc/os-release` (`NAME`, `VERSION_ID`).
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
}

/// A running systemd service.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Service {
    /// Unit name without the `.service` suffix.
    pub name: String,
    pub description: String,
    /// Whether the unit file was loaded successfully.
    pub load_state: String,
    /// High-level activation state (`active`, `failed`, ...).
    pub active_state: String,
    /// Unit-type specific state (`running`, `exited`, ...).
    pub sub_state: String,
}

/// One snapshot of host resource usage.
///
/// Created by the sampler, bucketed by creation minute, and consumed by the
/// sender which averages a whole minute into one representative sample.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ServerSample {
    pub hostname: String,
    pub cpu_used_percentage: f64,
    pub cpu_core_count: u32,
    pub load: ServerLoad,
    /// Total memory in bytes.
    pub memory_total: u64,
    pub memory_used_percentage: f64,
    /// Total disk size in bytes.
    pub disk_total: u64,
    pub disk_used_percentage: f64,
    #[serde(with = "rfc3339")]
    pub created_at: DateTime<Utc>,
    pub os: Option<OsInfo>,
    /// Boot time in seconds since epoch.
    pub boot_time: u64,
    pub reboot_required: bool,
    /// Service inventory; `None` when inventory collection is disabled.
    pub services: Option<Vec<Service>>,
}

impl ServerSample {
    /// Creates an empty sample stamped with `created_at`.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            hostname: String::new(),
            cpu_used_percentage: 0.0,
            cpu_core_count: 0,
            load: ServerLoad::default(),
            memory_total: 0,
            memory_used_percentage: 0.0,
            disk_total: 0,
            disk_used_percentage: 0.0,
            created_at,
            os: None,
            boot_time: 0,
            reboot_required: false,
            services: None,
        }
    }

    /// Serializes the sample into the JSON body sent to the remote API.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Second-precision RFC 3339 timestamps (`2024-05-29T14:23:00Z`).
mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Formats a timestamp the way it appears in serialized samples.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sample_json_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 29, 14, 23, 0).unwrap();
        let mut sample = ServerSample::new(ts);
        sample.hostname = "web-1".into();
        sample.cpu_used_percentage = 12.5;
        sample.cpu_core_count = 4;
        sample.services = Some(vec![Service {
            name: "nginx".into(),
            active_state: "active".into(),
            sub_state: "running".into(),
            ..Service::default()
        }]);

        let json: serde_json::Value = serde_json::from_str(&sample.to_json().unwrap()).unwrap();
        assert_eq!(json["created_at"], "2024-05-29T14:23:00Z");
        assert_eq!(json["hostname"], "web-1");
        assert_eq!(json["cpu_core_count"], 4);
        assert_eq!(json["load"]["load15"], 0.0);
        assert_eq!(json["services"][0]["name"], "nginx");
        assert!(json["os"].is_null());
    }

    #[test]
    fn test_sample_json_parses_back() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let sample = ServerSample::new(ts);
        let parsed: ServerSample = serde_json::from_str(&sample.to_json().unwrap()).unwrap();
        assert_eq!(parsed.created_at, ts);
        assert_eq!(format_timestamp(&parsed.created_at), "2024-01-02T03:04:05Z");
    }
}
