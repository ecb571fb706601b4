//! request-echo
//!
//! A debugging HTTP server that answers every request with a JSON description
//! of it and keeps the most recent ones under `/logs`.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ http::server ──▶ rate limit ──▶ handlers
//!                                       (h1 / h2c)                      │
//!                                                    ┌──────────────────┤
//!                                                    ▼                  ▼
//!                                            snapshot::builder     history::store
//!                                                    │               ▲      (/logs)
//!     Client Response ◀──── JSON snapshot ◀──────────┤               │
//!                                                    └──▶ history::persist
//!                                                         (background queue)
//! ```

use std::path::PathBuf;

use clap::Parser;

use request_echo::config::load_config;
use request_echo::lifecycle::{startup, Shutdown};
use request_echo::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "request-echo")]
#[command(about = "Reflects HTTP requests as JSON and keeps a rolling history", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overriding the config file and PORT.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.listener.set_port(port);
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("request-echo v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        history_path = %config.history.path,
        rate_limit = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validation has already checked the address.
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(error = %e, "Failed to parse metrics address"),
        }
    }

    startup::run(config, Shutdown::new(), true).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
