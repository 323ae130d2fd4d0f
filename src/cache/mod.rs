//! Cache Module
//!
//! Provides in-process caching with per-entry TTL, lazy expiry and mutation events.

mod entry;
mod handle;
mod stats;
mod store;


// Re-export public types
pub use entry::{expiry_from_now, is_past, CacheEntry};
pub use handle::{Cache, CacheBuilder};
pub use stats::{CacheStats, StatsCounter};
pub use store::EntryStore;
