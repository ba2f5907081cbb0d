//! Container environment detection.
//!
//! Used to tag API requests and to skip the systemd service inventory,
//! which is meaningless inside a container.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static IS_CONTAINER: LazyLock<bool> = LazyLock::new(detect_container);

const CGROUP_MARKERS: [&str; 5] = [
    "kubepods",
    "docker",
    "containerd",
    "lxc",
    "libpod",
];

/// Returns `true` if the agent runs inside a container. Cached after the
/// first call.
pub fn is_container() -> bool {
    *IS_CONTAINER
}

fn detect_container() -> bool {
    env::var("KUBERNETES_SERVICE_HOST").is_ok()
        || Path::new("/.dockerenv").exists()
        || Path::new("/run/.containerenv").exists()
        || fs::read_to_string("/proc/1/cgroup").is_ok_and(|content| cgroup_is_container(&content))
}

fn cgroup_is_container(content: &str) -> bool {
    CGROUP_MARKERS.iter().any(|marker| content.contains(marker))
}
