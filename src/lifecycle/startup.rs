//! Startup orchestration.
//!
//! Order: history store (fatal on failure) → writer task → listener →
//! serve until shutdown → drain connections → drain history queue.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EchoConfig;
use crate::history::{persist, HistoryStore};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::Listener;
use crate::resilience::RetryPolicy;

/// Run the server with `config` until `shutdown` fires. OS signals are wired
/// to `shutdown` when `install_signals` is set.
pub async fn run(
    config: EchoConfig,
    shutdown: Shutdown,
    install_signals: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Arc::new(HistoryStore::open(
        &config.history.path,
        config.history.capacity,
    )?);
    tracing::info!(
        path = %store.path().display(),
        capacity = store.capacity(),
        "History store ready"
    );

    let (persister, persist_handle) = persist::spawn(
        Arc::clone(&store),
        RetryPolicy::from(&config.persistence),
        config.persistence.queue_capacity,
    );

    let listener = Listener::bind(&config.listener).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    if install_signals {
        signals::spawn_signal_listener(shutdown.clone());
    }

    let drain_timeout = Duration::from_secs(config.shutdown.drain_timeout_secs);
    let server = HttpServer::new(config, store, persister);
    let served = server.run(listener, shutdown.subscribe()).await;

    if !persist_handle.close(drain_timeout).await {
        tracing::warn!("Some snapshots may not have been persisted");
    }

    served?;
    Ok(())
}
