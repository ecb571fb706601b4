//! Request history subsystem.
//!
//! # Data Flow
//! ```text
//! reflect handler
//!     → persist.rs (unbounded queue, single writer task)
//!     → store.rs (lock → read file → prepend → trim → write tmp → rename)
//!
//! /logs handler
//!     → store.rs (lock → read file)
//! ```
//!
//! # Design Decisions
//! - The JSON file is the source of truth; nothing is cached in memory
//! - One mutex orders every append and read
//! - Responses never wait for persistence

pub mod persist;
pub mod store;

pub use persist::{PersistHandle, Persister};
pub use store::{HistoryStore, StoreError};
