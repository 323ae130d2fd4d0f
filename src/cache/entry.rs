//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::Duration;

use chrono::{DateTime, Utc};

// == Cache Entry ==
/// Represents a single cache entry with value and expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    ///
    /// A zero `ttl` stores no expiration.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expiry_from_now(ttl),
        }
    }

    /// Creates an entry with an already computed expiration instant.
    pub fn with_expiry(value: V, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: An entry is considered expired when the current time
    /// is greater than or equal to the expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks expiry against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_past(self.expires_at, now)
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL (never expires)
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| (expires - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

// == Utility Functions ==
/// Computes `now + ttl`, or None when there is no positive TTL.
pub fn expiry_from_now(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    Utc::now().checked_add_signed(ttl)
}

/// True when `expires_at` is present and not after `now`.
pub fn is_past(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(expires) if now >= expires)
}
