//! Cache Statistics Module
//!
//! Tracks cache activity: hits, misses, lazy expirations and read-through fills.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Counter ==
/// Atomic counters updated on every cache operation.
#[derive(Debug, Default)]
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    fills: AtomicU64,
    sampler_passes: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fill(&self) {
        self.fills.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sampler_pass(&self) {
        self.sampler_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the statistics.
    pub fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            sampler_passes: self.sampler_passes.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Cache Stats ==
/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful local reads
    pub hits: u64,
    /// Number of reads that found nothing live locally
    pub misses: u64,
    /// Number of entries removed because their TTL had passed
    pub expirations: u64,
    /// Number of values written into the map by read-through
    pub fills: u64,
    /// Number of sample passes run by the passive expiry sampler
    pub sampler_passes: u64,
    /// Current number of entries in the map, expired-but-unevicted included
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
