//! HTTP request echo server library.
//!
//! Reflects every request back as JSON and keeps a capped, file-backed
//! history of recent requests under `/logs`.

pub mod config;
pub mod history;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod snapshot;

pub use config::EchoConfig;
pub use history::HistoryStore;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use snapshot::RequestSnapshot;
