//! Berth node - self-hosted repository server.
//!
//! Hosts the smart HTTP gateway over a directory of bare repositories.

use berth_storage::Signature;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod health;

use config::Config;

/// Berth - self-hosted code collaboration server
#[derive(Parser, Debug)]
#[command(name = "berth-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "berth.yaml")]
    config: PathBuf,

    /// HTTP listen address (overrides config)
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Repository storage directory (overrides config)
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides config)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a bare repository under the storage root and exit
    Init {
        /// Repository name
        name: String,
    },
}

fn main() {
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(addr) = args.listen_addr {
        config.listen_addr = addr;
    }
    if let Some(root) = args.storage_root {
        config.storage_root = root;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("berth={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Berth node");

    if let Err(e) = std::fs::create_dir_all(&config.storage_root) {
        tracing::error!(error = %e, "Failed to create storage root");
        std::process::exit(1);
    }

    if let Some(Command::Init { name }) = args.command {
        match init_repository(&config, &name) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Repository created");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Repository creation failed");
                std::process::exit(1);
            }
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Creates a bare repository with its initial commit, named so the
/// gateway can serve it.
fn init_repository(config: &Config, name: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    berth_gateway::validate_repo_id(name)?;
    let path = config.storage_root.join(format!("{}.git", name));
    let repo = berth_engine::init_repository(&path, &config.default_branch)?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let author = Signature {
        name: "berth".to_string(),
        email: "berth@localhost".to_string(),
        when: now,
        offset: "+0000".to_string(),
    };
    berth_engine::create_initial_commit(&repo, &author)?;
    Ok(path)
}

async fn serve(config: Config) -> std::io::Result<()> {
    let gateway_config = berth_gateway::GatewayConfig {
        storage_root: config.storage_root.clone(),
        base_url: config.base_url.clone(),
        max_fetch_bytes: config.max_fetch_bytes,
        max_push_bytes: config.max_push_bytes,
        timeout: Duration::from_secs(config.request_timeout_secs),
    };

    let app = axum::Router::new()
        .merge(health::routes())
        .merge(berth_gateway::router(gateway_config))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        storage_root = %config.storage_root.display(),
        "Node is ready. Press Ctrl+C to stop."
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
