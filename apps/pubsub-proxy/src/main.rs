//! Pub/Sub Proxy Binary
//!
//! Binds the upstream and downstream endpoints and forwards messages between
//! them until SIGINT/SIGTERM or a transport failure.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin pubsub-proxy
//! ```
//!
//! # Environment Variables
//!
//! - `XSUB_ADDR`: Address publishers connect to (default: tcp://*:5557)
//! - `XPUB_ADDR`: Address subscribers connect to (default: tcp://*:5558)
//! - `PROXY_TOPOLOGY`: pubsub | reqrep (default: pubsub)
//! - `PROXY_SHUTDOWN_GRACE_MS`: Pump drain timeout (default: 200)
//! - `PROXY_HIGH_WATER_MARK`: Socket high-water mark (default: 1000)
//! - `PROXY_XPUB_VERBOSE`: Forward duplicate subscriptions (default: false)
//! - `PROXY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: pubsub-proxy)
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Exit Codes
//!
//! - `0`: Shut down on signal
//! - `1`: Invalid configuration or an endpoint failed to bind
//! - `2`: A relay direction failed while running

use std::process::ExitCode;
use std::sync::Arc;

use pubsub_proxy::infrastructure::health::{HealthServer, HealthServerState};
use pubsub_proxy::infrastructure::telemetry;
use pubsub_proxy::infrastructure::zeromq::{SocketOptions, ZmqEndpoint};
use pubsub_proxy::{EndpointRole, ProxyConfig, ProxyStatus, ProxySupervisor, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Exit status for configuration errors.
const EXIT_CONFIG: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Pub/Sub Proxy");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let status = Arc::new(ProxyStatus::new());

    // Create endpoints sharing one ZeroMQ context
    let context = zmq::Context::new();
    let options = SocketOptions::from(&config.transport);
    let upstream = Arc::new(ZmqEndpoint::for_role(
        context.clone(),
        config.transport.topology,
        EndpointRole::Upstream,
        options,
    ));
    let downstream = Arc::new(ZmqEndpoint::for_role(
        context,
        config.transport.topology,
        EndpointRole::Downstream,
        options,
    ));

    // Spawn health server; it outlives the proxy token so probes see Stopped.
    let health_token = CancellationToken::new();
    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&status),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            health_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    // Spawn signal listener
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let supervisor = ProxySupervisor::new(
        config.supervisor_config(),
        upstream,
        downstream,
        shutdown_token,
        status,
    );
    let result = supervisor.run().await;
    health_token.cancel();

    match result {
        Ok(()) => {
            tracing::info!("Pub/Sub Proxy stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Pub/Sub Proxy exited with error");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ProxyConfig) {
    tracing::info!(
        upstream = %config.endpoints.upstream_address,
        downstream = %config.endpoints.downstream_address,
        topology = config.transport.topology.as_str(),
        health_port = config.server.health_port,
        grace_ms = u64::try_from(config.shutdown.grace_period.as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );
    tracing::debug!(
        high_water_mark = config.transport.high_water_mark,
        xpub_verbose = config.transport.xpub_verbose,
        "Socket options"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel the token.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
