//! Event Types
//!
//! Payloads raised by every successful Set, Unset and Clear.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Event Kind ==
/// Which mutation produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Set,
    Unset,
    Clear,
}

// == Cache Event ==
/// A mutation observed on a cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent<V> {
    /// A value was written, `expires_at` is None when it never expires
    Set {
        key: String,
        value: V,
        expires_at: Option<DateTime<Utc>>,
    },
    /// A key was removed. `value` is None when the removal was forced for a key
    /// the local map did not hold.
    Unset { key: String, value: Option<V> },
    /// Every entry was dropped
    Clear,
}

impl<V> CacheEvent<V> {
    pub fn kind(&self) -> EventKind {
        match self {
            CacheEvent::Set { .. } => EventKind::Set,
            CacheEvent::Unset { .. } => EventKind::Unset,
            CacheEvent::Clear => EventKind::Clear,
        }
    }

    /// The affected key, None for Clear.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Set { key, .. } | CacheEvent::Unset { key, .. } => Some(key),
            CacheEvent::Clear => None,
        }
    }

    /// The value carried by the event, if any.
    pub fn value(&self) -> Option<&V> {
        match self {
            CacheEvent::Set { value, .. } => Some(value),
            CacheEvent::Unset { value, .. } => value.as_ref(),
            CacheEvent::Clear => None,
        }
    }

    /// Expiry carried by a Set event.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CacheEvent::Set { expires_at, .. } => *expires_at,
            _ => None,
        }
    }
}
