//! systemd service inventory.

use std::process::Command;

use super::CollectError;
use crate::model::Service;

/// Source of the running service inventory.
pub trait ServiceSource: Send {
    fn running_services(&self) -> Result<Vec<Service>, CollectError>;
}

/// Lists running units through `systemctl`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Systemctl;

impl ServiceSource for Systemctl {
    fn running_services(&self) -> Result<Vec<Service>, CollectError> {
        let output = Command::new("systemctl")
            .args([
                "list-units",
                "--type=service",
                "--state=running",
                "--no-legend",
                "--plain",
                "--no-pager",
            ])
            .output()
            .map_err(|e| CollectError::Command(format!("failed to run systemctl: {}", e)))?;

        if !output.status.success() {
            return Err(CollectError::Command(format!(
                "systemctl exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_service_units(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses `systemctl list-units --no-legend --plain` output.
///
/// Columns: UNIT LOAD ACTIVE SUB DESCRIPTION. The description may contain
/// spaces. Non-service units and short lines are skipped.
pub fn parse_service_units(output: &str) -> Vec<Service> {
    let mut services = Vec::new();

    for line in output.lines() {
        let mut fields = line
            .split_whitespace()
            .skip_while(|field| *field == "●" || *field == "*");
        let (Some(unit), Some(load), Some(active), Some(sub)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let Some(name) = unit.strip_suffix(".service") else {
            continue;
        };

        services.push(Service {
            name: name.to_string(),
            description: fields.collect::<Vec<_>>().join(" "),
            load_state: load.to_string(),
            active_state: active.to_string(),
            sub_state: sub.to_string(),
        });
    }

    services
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_units() {
        let output = "\
cron.service                loaded active running Regular background program processing daemon
ssh.service                 loaded active running OpenBSD Secure Shell server
systemd-journald.service    loaded active running Journal Service
";
        let services = parse_service_units(output);
        assert_eq!(services.len(), 3);
        assert_eq!(
            services[0],
            Service {
                name: "cron".into(),
                description: "Regular background program processing daemon".into(),
                load_state: "loaded".into(),
                active_state: "active".into(),
                sub_state: "running".into(),
            }
        );
        assert_eq!(services[2].name, "systemd-journald");
    }

    #[test]
    fn test_parse_service_units_skips_noise() {
        let output = "\
● failed.service loaded failed failed Broken thing
dev-sda1.device loaded active plugged Disk
short.service loaded
\n";
        let services = parse_service_units(output);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "failed");
        assert_eq!(services[0].active_state, "failed");
        assert_eq!(services[0].description, "Broken thing");
    }

    #[test]
    fn test_parse_service_units_without_description() {
        let services = parse_service_units("bare.service loaded active running\n");
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].description, "");
    }
}
