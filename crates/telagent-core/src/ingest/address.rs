use std::fmt;
use std::path::PathBuf;

use super::ServerError;

/// Local endpoint the ingest server listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    /// Filesystem path of a Unix domain socket.
    Unix(PathBuf),
    /// `host:port` of a TCP listener.
    Tcp(String),
}

impl SocketAddress {
    /// Builds an address from a socket type (`unix` or `tcp`, case
    /// insensitive) and an address string.
    pub fn parse(socket_type: &str, address: &str) -> Result<Self, ServerError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ServerError::InvalidAddress("empty socket address".into()));
        }

        match socket_type.trim().to_ascii_lowercase().as_str() {
            "unix" => Ok(SocketAddress::Unix(PathBuf::from(address))),
            "tcp" => {
                let valid = address
                    .rsplit_once(':')
                    .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
                if !valid {
                    return Err(ServerError::InvalidAddress(format!(
                        "expected host:port, got {:?}",
                        address
                    )));
                }
                Ok(SocketAddress::Tcp(address.to_string()))
            }
            other => Err(ServerError::InvalidAddress(format!(
                "unknown socket type {:?} (expected unix or tcp)",
                other
            ))),
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Unix(path) => write!(f, "unix:{}", path.display()),
            SocketAddress::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix() {
        assert_eq!(
            SocketAddress::parse("unix", "/tmp/agent.sock").unwrap(),
            SocketAddress::Unix(PathBuf::from("/tmp/agent.sock"))
        );
        assert_eq!(
            SocketAddress::parse("UNIX", " /tmp/agent.sock ").unwrap().to_string(),
            "unix:/tmp/agent.sock"
        );
    }

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            SocketAddress::parse("tcp", "127.0.0.1:7000").unwrap(),
            SocketAddress::Tcp("127.0.0.1:7000".into())
        );
        assert_eq!(
            SocketAddress::parse("tcp", "localhost:7000").unwrap().to_string(),
            "tcp:localhost:7000"
        );
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for (kind, addr) in [
            ("udp", "127.0.0.1:7000"),
            ("tcp", "127.0.0.1"),
            ("tcp", ":7000"),
            ("tcp", "127.0.0.1:http"),
            ("unix", "  "),
        ] {
            assert!(
                matches!(
                    SocketAddress::parse(kind, addr),
                    Err(ServerError::InvalidAddress(_))
                ),
                "{} {} should be rejected",
                kind,
                addr
            );
        }
    }
}
