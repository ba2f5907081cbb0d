//! telagentd - host telemetry agent.
//!
//! Accepts application metrics on a local socket, samples host resources and
//! forwards both to the remote collection API.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use telagent_core::agent::{Agent, AgentConfig};
use telagent_core::api::{ApiCredentials, HttpClient};
use telagent_core::collector::HostConfig;
use telagent_core::ingest::SocketAddress;
use telagent_core::sender::{ConfigError, DeliveryConfig};
use telagent_core::util::{hostname as system_hostname, is_container};

/// Host telemetry agent.
#[derive(Parser, Debug)]
#[command(name = "telagentd", about = "Host telemetry agent", version = telagent_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent in the foreground until SIGINT/SIGTERM.
    #[command(visible_alias = "daemon")]
    Run(RunArgs),
    /// Print version information.
    Version {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Ingestion socket type.
    #[arg(long, env = "TELAGENT_SOCKET_TYPE", default_value = "unix", value_parser = ["unix", "tcp"])]
    socket_type: String,

    /// Socket path (unix) or host:port (tcp) to accept metrics on.
    #[arg(long, env = "TELAGENT_SOCKET_ADDRESS")]
    socket_address: String,

    /// Base URL of the collection API.
    #[arg(long, env = "TELAGENT_API_URL")]
    api_url: String,

    /// Environment name reported with every request.
    #[arg(long = "env", env = "TELAGENT_ENV", default_value = "production")]
    environment: String,

    /// Application id (basic auth user).
    #[arg(long, env = "TELAGENT_APP_ID")]
    app_id: String,

    /// Application key (basic auth password).
    #[arg(long, env = "TELAGENT_APP_KEY", hide_env_values = true)]
    app_key: String,

    /// Reported host name. Defaults to the kernel host name.
    #[arg(long, env = "TELAGENT_HOSTNAME")]
    hostname: Option<String>,

    /// Path to /proc filesystem.
    #[arg(long, env = "TELAGENT_PROC_PATH", default_value = "/proc")]
    proc_path: PathBuf,

    /// Path whose filesystem usage is reported.
    #[arg(long, env = "TELAGENT_DISK_PATH", default_value = "/")]
    disk_path: PathBuf,

    /// Sample host resources and send per-minute aggregates.
    /// Disable with --collect-server-resources=false.
    #[arg(long, env = "TELAGENT_COLLECT_SERVER_RESOURCES", default_value_t = true, action = clap::ArgAction::Set)]
    collect_server_resources: bool,

    /// Include running systemd services in server samples (ignored in containers).
    #[arg(long, env = "TELAGENT_COLLECT_SERVICES", default_value_t = false, action = clap::ArgAction::Set)]
    collect_services: bool,

    /// Host sampling interval in seconds.
    #[arg(long, env = "TELAGENT_SAMPLE_INTERVAL", default_value = "10")]
    sample_interval: u64,

    /// Buffered metric count that triggers an immediate send.
    #[arg(long, env = "TELAGENT_FILL_THRESHOLD", default_value = "200")]
    fill_threshold: usize,

    /// Seconds without a successful send after which buffered metrics are flushed.
    #[arg(long, env = "TELAGENT_IDLE_INTERVAL", default_value = "10")]
    idle_interval: u64,

    /// Maximum buffered metrics; the oldest excess is discarded.
    #[arg(long, env = "TELAGENT_OVERFLOW_CEILING", default_value = "20000")]
    overflow_ceiling: usize,

    /// Seconds before a failed batch is retried.
    #[arg(long, env = "TELAGENT_RETRY_BACKOFF", default_value = "5")]
    retry_backoff: u64,
}

impl RunArgs {
    fn to_config(&self) -> Result<(AgentConfig, ApiCredentials), ConfigError> {
        let socket = SocketAddress::parse(&self.socket_type, &self.socket_address)
            .map_err(|e| ConfigError::invalid("socket-address", e.to_string()))?;
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Missing("api-url"));
        }
        if self.app_id.is_empty() {
            return Err(ConfigError::Missing("app-id"));
        }
        if self.app_key.is_empty() {
            return Err(ConfigError::Missing("app-key"));
        }

        let hostname = self
            .hostname
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(system_hostname)
            .unwrap_or_else(|| "unknown".to_string());

        let mut config = AgentConfig::new(socket);
        config.delivery = DeliveryConfig {
            fill_threshold: self.fill_threshold,
            idle_interval: Duration::from_secs(self.idle_interval),
            overflow_ceiling: self.overflow_ceiling,
            retry_backoff: Duration::from_secs(self.retry_backoff),
            ..DeliveryConfig::default()
        };
        config.host = HostConfig {
            hostname: hostname.clone(),
            proc_path: self.proc_path.clone(),
            disk_path: self.disk_path.clone(),
            collect_services: self.collect_services,
            ..HostConfig::default()
        };
        config.collect_server_resources = self.collect_server_resources;
        config.sample_interval = Duration::from_secs(self.sample_interval);
        config.validate()?;

        let credentials = ApiCredentials {
            url: self.api_url.clone(),
            environment: self.environment.clone(),
            app_id: self.app_id.clone(),
            app_key: self.app_key.clone(),
            hostname,
            in_container: is_container(),
        };
        Ok((config, credentials))
    }
}

#[derive(Serialize)]
struct VersionInfo {
    version: &'static str,
    git_sha: &'static str,
    git_tag: &'static str,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["telagentd", "telagent_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_version(json: bool) -> ExitCode {
    let info = VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: telagent_core::GIT_SHA,
        git_tag: telagent_core::GIT_TAG,
    };
    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("failed to encode version: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("telagentd {}", telagent_core::VERSION);
    }
    ExitCode::SUCCESS
}

fn run(args: RunArgs) -> ExitCode {
    let (config, credentials) = match args.to_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    info!("telagentd {} starting", telagent_core::VERSION);
    info!(
        socket = %config.socket,
        api_url = %credentials.url,
        environment = %credentials.environment,
        hostname = %credentials.hostname,
        in_container = credentials.in_container,
        "configuration loaded"
    );

    let api = match HttpClient::new(credentials) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!(error = %e, "failed to create API client");
            return ExitCode::FAILURE;
        }
    };
    let agent = match Agent::new(config, api) {
        Ok(agent) => agent,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        token.cancel();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(agent.run(cancel)) {
        Ok(()) => {
            info!("telagentd stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Version { json } => print_version(json),
        Command::Run(args) => run(args),
    }
}
