//! TTL Cache - An in-process key-value cache
//!
//! Provides per-entry TTL with lazy and sampled expiry, default-on-miss reads,
//! and synchronous mutation events for observers and backing stores.

pub mod backing;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod tasks;

pub use backing::{Fetched, ReadThrough};
pub use cache::{Cache, CacheBuilder, CacheStats};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use events::{CacheEvent, EventKind, EventWaiter, Subscription};
pub use registry::{shared, shared_with, Registry};
