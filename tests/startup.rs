//! Full startup path: config → store → listener → serve → shutdown.

use std::time::Duration;

use request_echo::config::EchoConfig;
use request_echo::lifecycle::{startup, Shutdown};
use request_echo::HistoryStore;
use serde_json::Value;

#[tokio::test]
async fn run_serves_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("logs/history.json");

    // Reserve a free port, then hand it to the server.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut config = EchoConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{}", port);
    config.history.path = history.display().to_string();
    config.rate_limit.enabled = false;

    let shutdown = Shutdown::new();
    let server = tokio::spawn(startup::run(config, shutdown.clone(), false));

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("http://127.0.0.1:{}/hello", port);
    let mut response = None;
    for _ in 0..50 {
        match client.get(&url).send().await {
            Ok(res) => {
                response = Some(res);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let snapshot: Value = response.expect("server never came up").json().await.unwrap();
    assert_eq!(snapshot["uri"], "/hello");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let store = HistoryStore::open(&history, 50).unwrap();
    let entries = store.read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].uri(), "/hello");
}

#[tokio::test]
async fn unusable_history_path_is_fatal() {
    let dir = tempfile::tempdir().unwrap();

    let mut config = EchoConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    // A directory cannot serve as the history file.
    config.history.path = dir.path().display().to_string();

    let result = startup::run(config, Shutdown::new(), false).await;
    assert!(result.is_err());
}
