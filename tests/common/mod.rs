//! Shared helpers for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use request_echo::config::EchoConfig;
use request_echo::history::{persist, HistoryStore, PersistHandle};
use request_echo::http::HttpServer;
use request_echo::lifecycle::Shutdown;
use request_echo::net::Listener;
use request_echo::resilience::RetryPolicy;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Config for tests: ephemeral port, no rate limiting.
pub fn test_config() -> EchoConfig {
    let mut config = EchoConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.rate_limit.enabled = false;
    config.shutdown.drain_timeout_secs = 5;
    config
}

/// A running server with its own history file.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<HistoryStore>,
    shutdown: Shutdown,
    server: JoinHandle<()>,
    persist: PersistHandle,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start(mut config: EchoConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        config.history.path = dir.path().join("history.json").display().to_string();

        let store = Arc::new(
            HistoryStore::open(&config.history.path, config.history.capacity).unwrap(),
        );
        let (persister, persist) = persist::spawn(
            Arc::clone(&store),
            RetryPolicy::from(&config.persistence),
            config.persistence.queue_capacity,
        );

        let listener = Listener::bind(&config.listener).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.subscribe();
        let server = HttpServer::new(config, Arc::clone(&store), persister);
        let server = tokio::spawn(async move {
            server.run(listener, server_shutdown).await.unwrap();
        });

        Self {
            addr,
            store,
            shutdown,
            server,
            persist,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Poll the store until it holds `len` entries or two seconds pass.
    pub async fn wait_for_history(&self, len: usize) -> usize {
        let mut current = 0;
        for _ in 0..200 {
            current = self.store.read_all().map(|e| e.len()).unwrap_or(0);
            if current >= len {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        current
    }

    /// Stop accepting, drain connections, then drain the history queue.
    pub async fn stop(self) -> Arc<HistoryStore> {
        self.shutdown.trigger();
        self.server.await.unwrap();
        assert!(self.persist.close(Duration::from_secs(5)).await);
        // The caller reads the history file after stop; keep its directory.
        let _ = self._dir.keep();
        self.store
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
