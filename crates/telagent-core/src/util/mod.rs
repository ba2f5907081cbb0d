//! Helper utilities.

mod container;

pub use container::is_container;

/// Kernel host name, `None` if it cannot be read or is not UTF-8.
pub fn hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_not_blank() {
        if let Some(name) = hostname() {
            assert!(!name.trim().is_empty());
        }
    }
}
