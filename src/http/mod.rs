//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper-util auto: HTTP/1.1 or h2c, Axum router)
//!     → rate limiter
//!     → handlers.rs
//!         /logs → history store
//!         *     → snapshot builder → response + history queue
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
