use std::convert::Infallible;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::{ServerError, SocketAddress};

type Connection = Box<dyn AsyncRead + Unpin + Send>;
type Handler = Arc<dyn Fn(String) + Send + Sync>;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Time a client has to send its payload and close the connection.
    pub read_timeout: Duration,
    /// Largest accepted payload; longer ones are dropped whole.
    pub max_payload_bytes: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Bound listener. A Unix socket file is removed when this is dropped.
enum Listener {
    Unix(UnixListener, PathBuf),
    Tcp(TcpListener),
}

impl Listener {
    async fn bind(address: &SocketAddress) -> io::Result<Self> {
        match address {
            SocketAddress::Unix(path) => {
                match std::fs::remove_file(path) {
                    Ok(()) => debug!(path = %path.display(), "removed stale socket file"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
                Ok(Listener::Unix(UnixListener::bind(path)?, path.clone()))
            }
            SocketAddress::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr.as_str()).await?)),
        }
    }

    async fn accept(&self) -> io::Result<Connection> {
        match self {
            Listener::Unix(listener, _) => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                trace!(%peer, "accepted tcp connection");
                Ok(Box::new(stream))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix(_, path) = self {
            if let Err(e) = std::fs::remove_file(path.as_path()) {
                debug!(path = %path.display(), error = %e, "failed to remove socket file");
            }
        }
    }
}

/// Accepts connections and dispatches one trimmed payload per connection.
pub struct IngestServer {
    address: SocketAddress,
    options: IngestOptions,
    stop: CancellationToken,
    connections: TaskTracker,
}

impl IngestServer {
    pub fn new(address: SocketAddress) -> Self {
        Self {
            address,
            options: IngestOptions::default(),
            stop: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    /// Binds the listener and serves until stopped.
    ///
    /// Never returns `Ok`. After [`stop`](Self::stop) the result is
    /// `Err(ServerError::Stopped)`, returned once connections accepted
    /// before the stop were handled (at most `read_timeout` later). Any
    /// other error is fatal.
    pub async fn start<H>(&self, handler: H) -> Result<Infallible, ServerError>
    where
        H: Fn(String) + Send + Sync + 'static,
    {
        let listener = Listener::bind(&self.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.address.to_string(),
                source,
            })?;
        info!(address = %self.address, "listening for metrics");

        let handler: Handler = Arc::new(handler);
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok(conn) => {
                    let handler = Arc::clone(&handler);
                    let options = self.options;
                    self.connections.spawn(async move {
                        if let Some(payload) = read_submission(conn, options).await {
                            handler(payload);
                        }
                    });
                }
                Err(_) if self.stop.is_cancelled() => break,
                Err(e) => return Err(ServerError::Accept(e)),
            }
        }

        drop(listener);
        self.finish_connections().await;
        info!(address = %self.address, "ingest server stopped");
        Err(ServerError::Stopped)
    }

    async fn finish_connections(&self) {
        self.connections.close();
        let pending = self.connections.len();
        if pending == 0 {
            return;
        }
        debug!(pending, "waiting for open connections");
        let grace = self.options.read_timeout + Duration::from_millis(100);
        if tokio::time::timeout(grace, self.connections.wait()).await.is_err() {
            warn!(
                pending = self.connections.len(),
                "connections still open after stop, abandoning them"
            );
        }
    }

    /// Stops the accept loop. Idempotent; safe to call before `start`.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Reads one submission to end of stream. Returns `None` for payloads that
/// are dropped (timeout, I/O error, oversized, invalid UTF-8, blank).
async fn read_submission(conn: Connection, options: IngestOptions) -> Option<String> {
    let mut buf = Vec::new();
    let limit = options.max_payload_bytes as u64 + 1;
    let read = tokio::time::timeout(options.read_timeout, conn.take(limit).read_to_end(&mut buf)).await;

    match read {
        Err(_) => {
            warn!(
                timeout_ms = options.read_timeout.as_millis() as u64,
                "connection read timed out, dropping submission"
            );
            return None;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "failed to read submission");
            return None;
        }
        Ok(Ok(_)) => {}
    }

    if buf.len() > options.max_payload_bytes {
        warn!(
            max_bytes = options.max_payload_bytes,
            "submission too large, dropping"
        );
        return None;
    }

    let text = match String::from_utf8(buf) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "submission is not valid UTF-8, dropping");
            return None;
        }
    };

    let payload = text.trim();
    if payload.is_empty() {
        debug!("empty submission, dropping");
        return None;
    }
    Some(payload.to_string())
}
