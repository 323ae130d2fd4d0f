//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Core cache operations never return these. They surface from construction,
/// configuration loading, and as the reported form of swallowed collaborator
/// and subscriber failures.
#[derive(Error, Debug)]
pub enum CacheError {
    /// TTL value could not be used (negative, NaN or infinite)
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Configuration value could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Background work was requested without a tokio runtime
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// Read-through collaborator failed or timed out
    #[error("Backing store error: {0}")]
    Backing(String),

    /// Event subscriber returned an error or panicked
    #[error("Subscriber failed: {0}")]
    Subscriber(String),
}

impl CacheError {
    /// Wraps a collaborator failure for reporting.
    pub fn backing(err: impl std::fmt::Display) -> Self {
        CacheError::Backing(err.to_string())
    }

    /// Wraps a subscriber failure for reporting.
    pub fn subscriber(err: impl std::fmt::Display) -> Self {
        CacheError::Subscriber(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
