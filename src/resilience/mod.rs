//! Resilience helpers.
//!
//! History writes are best-effort: a failed append is retried with
//! exponential backoff (backoff.rs) and dropped once the attempts run out.

pub mod backoff;

pub use backoff::{calculate_backoff, RetryPolicy};
