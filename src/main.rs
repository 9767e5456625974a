use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatekeeper::config::{GatekeeperConfig, LoggingConfig};
use gatekeeper::http::{AppState, HttpServer, ResponseShaper};
use gatekeeper::ratelimit::RateLimiter;

/// Per-identifier rate limiting service.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatekeeperConfig::from_file(path)?,
        None => GatekeeperConfig::from_env()?,
    };
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Gatekeeper Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        config_path = ?args.config,
        "Configuration loaded"
    );

    // Initialize the rate limiter
    let policies = config.policy_table()?;
    info!(policies = ?policies.names(), "Policy table loaded");
    let rate_limiter = Arc::new(RateLimiter::new(policies));

    let janitor = rate_limiter
        .janitor(config.janitor.retention())
        .spawn(config.janitor.interval());

    let state = Arc::new(AppState::new(
        Arc::clone(&rate_limiter),
        ResponseShaper::new(config.server.reset_format),
    ));
    let http_server = HttpServer::new(config.server.http_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    let served = http_server.serve_with_shutdown(shutdown_signal()).await;

    janitor.shutdown().await;
    served?;

    info!("Gatekeeper Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
