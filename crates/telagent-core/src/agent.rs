//! Wiring of buffers, sender, sampler and ingest server.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::MetricsApi;
use crate::buffer::{MetricBuffer, MinuteBuffer};
use crate::collector::{HostCollector, HostConfig, RealFs};
use crate::ingest::{IngestOptions, IngestServer, ServerError, SocketAddress};
use crate::sampler::{SampleSource, Sampler};
use crate::sender::{ConfigError, DeliveryConfig, Sender};

/// Everything the agent needs besides the API client.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub socket: SocketAddress,
    pub ingest: IngestOptions,
    pub delivery: DeliveryConfig,
    pub host: HostConfig,
    /// Sample host resources and send per-minute aggregates.
    pub collect_server_resources: bool,
    pub sample_interval: Duration,
}

impl AgentConfig {
    pub fn new(socket: SocketAddress) -> Self {
        Self {
            socket,
            ingest: IngestOptions::default(),
            delivery: DeliveryConfig::default(),
            host: HostConfig::default(),
            collect_server_resources: true,
            sample_interval: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delivery.validate()?;
        if self.sample_interval.is_zero() {
            return Err(ConfigError::invalid("sample_interval", "must be non-zero"));
        }
        if self.ingest.max_payload_bytes == 0 {
            return Err(ConfigError::invalid("max_payload_bytes", "must be at least 1"));
        }
        if self.ingest.read_timeout.is_zero() {
            return Err(ConfigError::invalid("read_timeout", "must be non-zero"));
        }
        Ok(())
    }
}

/// Error type for a failed agent run.
#[derive(Debug)]
pub enum AgentError {
    Config(ConfigError),
    Server(ServerError),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Config(e) => write!(f, "configuration error: {}", e),
            AgentError::Server(e) => write!(f, "ingest server error: {}", e),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgentError::Config(e) => Some(e),
            AgentError::Server(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AgentError {
    fn from(e: ConfigError) -> Self {
        AgentError::Config(e)
    }
}

impl From<ServerError> for AgentError {
    fn from(e: ServerError) -> Self {
        AgentError::Server(e)
    }
}

/// The running agent.
pub struct Agent<A: MetricsApi> {
    config: AgentConfig,
    api: Arc<A>,
    app_buffer: Arc<MetricBuffer>,
    server_buffer: Arc<MinuteBuffer>,
}

impl<A: MetricsApi> Agent<A> {
    pub fn new(config: AgentConfig, api: Arc<A>) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self {
            config,
            api,
            app_buffer: Arc::new(MetricBuffer::new()),
            server_buffer: Arc::new(MinuteBuffer::new()),
        })
    }

    pub fn app_buffer(&self) -> Arc<MetricBuffer> {
        Arc::clone(&self.app_buffer)
    }

    pub fn server_buffer(&self) -> Arc<MinuteBuffer> {
        Arc::clone(&self.server_buffer)
    }

    /// Runs with the `/proc` host collector (when enabled) until `cancel`
    /// fires or the ingest server fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AgentError> {
        let source = self
            .config
            .collect_server_resources
            .then(|| HostCollector::new(RealFs::new(), self.config.host.clone()));
        self.run_with_source(source, cancel).await
    }

    /// Runs with a custom sample source; `None` disables server metrics.
    ///
    /// Shutdown order: stop the ingest server and let accepted connections
    /// finish, cancel every loop, wait for them, then drain the app buffer
    /// once.
    pub async fn run_with_source<S: SampleSource>(
        self,
        source: Option<S>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let sender = Arc::new(Sender::new(
            Arc::clone(&self.api),
            Arc::clone(&self.app_buffer),
            Arc::clone(&self.server_buffer),
            self.config.delivery.clone(),
            cancel.clone(),
        ));

        let mut loops = sender.spawn_app_loops();
        if let Some(source) = source {
            loops.push(sender.spawn_server_loop());
            let sampler = Sampler::new(
                source,
                Arc::clone(&self.server_buffer),
                self.config.sample_interval,
            );
            loops.push(sampler.spawn(cancel.clone()));
        }
        info!(
            socket = %self.config.socket,
            server_metrics = self.config.collect_server_resources,
            fill_threshold = self.config.delivery.fill_threshold,
            "agent started"
        );

        let server = IngestServer::new(self.config.socket.clone()).with_options(self.config.ingest);
        let app_buffer = Arc::clone(&self.app_buffer);
        let serve = server.start(move |payload| app_buffer.append(payload));
        tokio::pin!(serve);

        let result = tokio::select! {
            result = &mut serve => result,
            _ = cancel.cancelled() => {
                server.stop();
                serve.await
            }
        };
        let failure = match result {
            Err(e) if e.is_stopped() => None,
            Err(e) => {
                error!(error = %e, "ingest server failed, shutting down");
                Some(e)
            }
            Ok(never) => match never {},
        };

        cancel.cancel();
        for handle in loops {
            if let Err(e) = handle.await {
                error!(error = %e, "background loop panicked");
            }
        }
        sender.drain().await;
        info!("agent stopped");

        match failure {
            Some(e) => Err(AgentError::Server(e)),
            None => Ok(()),
        }
    }
}
