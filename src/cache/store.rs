//! Cache Store Module
//!
//! Entry storage with lazy TTL expiry. Every successful Set, Unset and Clear is
//! announced through the store's [`Notifier`] before the call returns.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::cache::{CacheEntry, StatsCounter};
use crate::events::{CacheEvent, Notifier};

// == Entry Store ==
/// Key to entry map plus the notifier its mutations fire through.
///
/// Lock order is always sequence guard, then map lock. Hits only take the map
/// read lock.
pub struct EntryStore<V> {
    /// Key-value storage
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    /// Event fan-out
    notifier: Notifier<V>,
    /// Activity counters
    stats: StatsCounter,
}

impl<V> EntryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            notifier: Notifier::new(),
            stats: StatsCounter::new(),
        }
    }

    pub fn notifier(&self) -> &Notifier<V> {
        &self.notifier
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    // == Set ==
    /// Stores a value, replacing any previous entry and its expiry.
    ///
    /// Returns the computed expiration instant, None if `ttl` is absent or zero.
    pub fn set(&self, key: String, value: V, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        let _sequence = self.notifier.sequence();

        let entry = CacheEntry::new(value, ttl);
        let expires_at = entry.expires_at;
        let event = CacheEvent::Set {
            key: key.clone(),
            value: entry.value.clone(),
            expires_at,
        };
        self.entries.write().insert(key, entry);

        self.notifier.fire(event);
        expires_at
    }

    // == Unset ==
    /// Removes the raw entry whether or not it has expired.
    ///
    /// Fires Unset only when something was removed.
    pub fn unset(&self, key: &str) -> Option<V> {
        let _sequence = self.notifier.sequence();

        let removed = self.entries.write().remove(key)?;
        self.notifier.fire(CacheEvent::Unset {
            key: key.to_string(),
            value: Some(removed.value.clone()),
        });
        Some(removed.value)
    }

    /// Removes `key` and announces the removal even if the map never held it.
    ///
    /// Used when a backing store hands back an entry that is already expired,
    /// so observers mirroring the cache drop their copy too.
    pub fn retire(&self, key: &str) {
        let _sequence = self.notifier.sequence();

        if self.unset(key).is_none() {
            debug!(key, "forcing unset for key absent locally");
            self.notifier.fire(CacheEvent::Unset {
                key: key.to_string(),
                value: None,
            });
        }
    }

    // == Lookup ==
    /// Reads a live entry through `read`.
    ///
    /// An entry found past its expiry is evicted through the Unset path and
    /// reported as a miss. This is the only read path, shared by callers and
    /// the passive sampler.
    pub fn lookup<R>(&self, key: &str, read: impl FnOnce(&V) -> R) -> Option<R> {
        let now = Utc::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(read(&entry.value)),
                Some(_) => {}
            }
        }

        self.expire(key);
        None
    }

    // == Expire ==
    /// Evicts `key` if it is still expired once the write lock is held.
    ///
    /// A concurrent Set between the expired read and this call wins, so each
    /// expired entry produces exactly one Unset.
    pub fn expire(&self, key: &str) -> bool {
        let _sequence = self.notifier.sequence();

        let removed = {
            let mut entries = self.entries.write();
            match entries.get(key) {
                Some(entry) if entry.is_expired() => entries.remove(key),
                _ => None,
            }
        };

        let Some(entry) = removed else {
            return false;
        };
        self.stats.record_expiration();
        debug!(key, "evicted expired entry");
        self.notifier.fire(CacheEvent::Unset {
            key: key.to_string(),
            value: Some(entry.value),
        });
        true
    }

    // == Fill ==
    /// Commits a value fetched from a backing store without firing an event.
    ///
    /// A live local entry written while the fetch was in flight is kept.
    /// Returns whichever value ends up cached.
    pub fn fill(&self, key: &str, value: V, expires_at: Option<DateTime<Utc>>) -> V {
        let _sequence = self.notifier.sequence();

        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(key).filter(|entry| !entry.is_expired()) {
            return existing.value.clone();
        }
        entries.insert(
            key.to_string(),
            CacheEntry::with_expiry(value.clone(), expires_at),
        );
        self.stats.record_fill();
        debug!(key, "filled entry from backing store");
        value
    }

    // == Clear ==
    /// Drops every entry and fires a single Clear.
    pub fn clear(&self) {
        let _sequence = self.notifier.sequence();

        self.entries.write().clear();
        self.notifier.fire(CacheEvent::Clear);
    }

    // == Clean ==
    /// Evicts every expired entry, returning how many were removed.
    pub fn clean(&self) -> usize {
        let now = Utc::now();
        let expired_keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .iter()
            .filter(|key| self.expire(key))
            .count()
    }

    // == Inspection ==
    /// Number of entries in the map, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every key in the map.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Whether `key` holds a live entry. Never evicts.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Expiration instant of a live entry.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.expires_at)
    }
}

impl<V> Default for EntryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
