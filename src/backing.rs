//! Backing Store Contract
//!
//! What a cross-process backing store plugs into: it observes every mutation
//! event (write-through) and is asked once per local miss on the async read
//! path (read-through). Its failures never reach cache callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::CacheEvent;

// == Fetched ==
/// A value handed back by a backing store on a local miss.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<V> {
    pub value: V,
    /// Expiry recorded by the backing store, None = never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl<V> Fetched<V> {
    pub fn new(value: V, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expires_at }
    }
}

// == Read Through ==
#[async_trait]
pub trait ReadThrough<V>: Send + Sync {
    /// Looks `key` up remotely. `Ok(None)` is a remote miss.
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Fetched<V>>>;

    /// Called synchronously for every event the cache fires.
    ///
    /// Runs inside the mutating call, so remote I/O belongs on a spawned task.
    fn observe(&self, event: &CacheEvent<V>) -> anyhow::Result<()> {
        let _ = event;
        Ok(())
    }
}
