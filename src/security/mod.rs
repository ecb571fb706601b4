//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-peer token bucket, 429 when exhausted)
//!     → handlers
//!         → client_ip.rs (X-Real-IP / X-Forwarded-For / peer)
//! ```

pub mod client_ip;
pub mod rate_limit;

pub use client_ip::resolve_client_ip;
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
