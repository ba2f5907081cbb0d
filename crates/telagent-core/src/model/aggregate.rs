//! Per-minute aggregation of server samples.

use super::sample::{ServerLoad, ServerSample};

/// Rounds to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean of one gauge across `samples`, rounded to two decimals.
fn mean(samples: &[ServerSample], gauge: impl Fn(&ServerSample) -> f64) -> f64 {
    round2(samples.iter().map(gauge).sum::<f64>() / samples.len() as f64)
}

/// Aggregates one minute worth of samples into a representative sample.
///
/// Gauges (CPU, memory and disk percentages, load averages) are averaged and
/// rounded to two decimals. Everything else (core count, totals, timestamp,
/// inventory, host identification) is taken from the last sample, which is
/// the chronologically newest one since samples are appended in order.
///
/// Returns `None` for an empty slice.
pub fn aggregate(samples: &[ServerSample]) -> Option<ServerSample> {
    let last = samples.last()?;

    Some(ServerSample {
        cpu_used_percentage: mean(samples, |s| s.cpu_used_percentage),
        memory_used_percentage: mean(samples, |s| s.memory_used_percentage),
        disk_used_percentage: mean(samples, |s| s.disk_used_percentage),
        load: ServerLoad {
            load1: mean(samples, |s| s.load.load1),
            load5: mean(samples, |s| s.load.load5),
            load15: mean(samples, |s| s.load.load15),
        },
        ..last.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(cpu: f64, cores: u32, load: f64, mem: f64, disk: f64) -> ServerSample {
        let mut s = ServerSample::new(Utc.with_ymd_and_hms(2024, 5, 29, 14, 0, 0).unwrap());
        s.cpu_used_percentage = cpu;
        s.cpu_core_count = cores;
        s.load = ServerLoad {
            load1: load,
            load5: load,
            load15: load,
        };
        s.memory_used_percentage = mem;
        s.disk_used_percentage = disk;
        s
    }

    #[test]
    fn test_aggregate_averages_gauges_and_keeps_last_snapshot_fields() {
        let first = sample(5.0, 1, 2.0, 3.0, 3.0);
        let mut last = sample(15.0, 3, 8.0, 1.0, 1.0);
        last.memory_total = 5;
        last.disk_total = 5;
        last.created_at = Utc.with_ymd_and_hms(2024, 5, 29, 14, 0, 50).unwrap();
        last.hostname = "db-2".into();

        let metric = aggregate(&[first, last.clone()]).unwrap();

        assert_eq!(metric.cpu_used_percentage, 10.0);
        assert_eq!(metric.cpu_core_count, 3);
        assert_eq!(metric.load.load1, 5.0);
        assert_eq!(metric.load.load5, 5.0);
        assert_eq!(metric.load.load15, 5.0);
        assert_eq!(metric.disk_used_percentage, 2.0);
        assert_eq!(metric.memory_used_percentage, 2.0);
        assert_eq!(metric.memory_total, 5);
        assert_eq!(metric.disk_total, 5);
        assert_eq!(metric.created_at, last.created_at);
        assert_eq!(metric.hostname, "db-2");
    }

    #[test]
    fn test_aggregate_rounds_to_two_decimals() {
        let samples = [
            sample(1.0, 2, 0.0, 0.0, 0.0),
            sample(1.0, 2, 0.0, 0.0, 0.0),
            sample(2.0, 2, 0.0, 0.0, 0.0),
        ];
        let metric = aggregate(&samples).unwrap();
        assert_eq!(metric.cpu_used_percentage, 1.33);
    }

    #[test]
    fn test_aggregate_single_sample_is_identity_for_gauges() {
        let s = sample(42.424, 8, 1.5, 60.0, 70.0);
        let metric = aggregate(std::slice::from_ref(&s)).unwrap();
        assert_eq!(metric.cpu_used_percentage, 42.42);
        assert_eq!(metric.load.load1, 1.5);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[]).is_none());
    }
}
