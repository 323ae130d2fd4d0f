//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Number of keys the sampler inspects per pass.
pub const DEFAULT_SAMPLE_SIZE: usize = 20;

/// Fraction of a sample that must be expired for the sampler to go again.
pub const DEFAULT_EXPIRED_THRESHOLD: f64 = 0.25;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL applied to writes without an explicit TTL, None = never expire
    pub default_ttl: Option<Duration>,
    /// Passive expiry switch, None = enabled iff a default TTL is set
    pub passive_expiry: Option<bool>,
    /// Keys sampled per sampler pass
    pub sample_size: usize,
    /// Expired fraction of a sample that keeps the sampler going
    pub expired_threshold: f64,
    /// Sampler sleep after an active phase
    pub cooldown: Duration,
    /// Sampler poll interval while the cache is too small to sample
    pub idle_poll: Duration,
    /// Upper bound on a single read-through fetch
    pub read_through_timeout: Duration,
}

impl CacheConfig {
    /// Creates a config with the given default TTL and everything else defaulted.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: normalize_ttl(ttl),
            ..Self::default()
        }
    }

    /// Whether the sampler should run for this configuration.
    pub fn passive_expiry_enabled(&self) -> bool {
        self.passive_expiry.unwrap_or(self.default_ttl.is_some())
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds, fractional allowed, 0 = none (default: none)
    /// - `CACHE_PASSIVE_EXPIRY` - `true`/`false` (default: on iff a default TTL is set)
    /// - `CACHE_SAMPLE_SIZE` - Keys per sampler pass (default: 20)
    /// - `CACHE_COOLDOWN_MS` - Sampler cool-down in milliseconds (default: 1000)
    /// - `CACHE_IDLE_POLL_MS` - Sampler idle poll in milliseconds (default: 50)
    /// - `CACHE_READ_THROUGH_TIMEOUT_MS` - Read-through timeout in milliseconds (default: 2000)
    ///
    /// Unset variables take the default. A variable that is set but does not
    /// parse is an error: `CacheError::InvalidTtl` for `CACHE_DEFAULT_TTL`,
    /// `CacheError::InvalidConfig` for the rest.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let default_ttl = match env::var("CACHE_DEFAULT_TTL") {
            Ok(raw) => parse_ttl_secs(&raw)?,
            Err(_) => defaults.default_ttl,
        };

        let passive_expiry = env_parse::<bool>("CACHE_PASSIVE_EXPIRY")?.or(defaults.passive_expiry);

        let sample_size = env_parse("CACHE_SAMPLE_SIZE")?.unwrap_or(defaults.sample_size);
        if sample_size == 0 {
            return Err(CacheError::InvalidConfig(
                "CACHE_SAMPLE_SIZE must be positive".to_string(),
            ));
        }

        Ok(Self {
            default_ttl,
            passive_expiry,
            sample_size,
            cooldown: env_millis("CACHE_COOLDOWN_MS")?.unwrap_or(defaults.cooldown),
            idle_poll: env_millis("CACHE_IDLE_POLL_MS")?.unwrap_or(defaults.idle_poll),
            read_through_timeout: env_millis("CACHE_READ_THROUGH_TIMEOUT_MS")?
                .unwrap_or(defaults.read_through_timeout),
            ..defaults
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            passive_expiry: None,
            sample_size: DEFAULT_SAMPLE_SIZE,
            expired_threshold: DEFAULT_EXPIRED_THRESHOLD,
            cooldown: Duration::from_secs(1),
            idle_poll: Duration::from_millis(50),
            read_through_timeout: Duration::from_secs(2),
        }
    }
}

// == TTL Parsing ==
/// Parses a TTL given in (possibly fractional) seconds.
///
/// `0` means no TTL. Negative, NaN and infinite values are rejected.
pub fn parse_ttl_secs(raw: &str) -> Result<Option<Duration>> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CacheError::InvalidTtl(format!("not a number: {raw:?}")))?;
    let ttl = Duration::try_from_secs_f64(secs)
        .map_err(|_| CacheError::InvalidTtl(format!("must be finite and non-negative: {raw:?}")))?;
    Ok(normalize_ttl(ttl))
}

/// Maps a zero duration to "no TTL".
pub fn normalize_ttl(ttl: Duration) -> Option<Duration> {
    (!ttl.is_zero()).then_some(ttl)
}

/// Reads and parses `name`. Unset is `Ok(None)`, unparseable is an error.
fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            CacheError::InvalidConfig(format!("{name} has an invalid value: {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}
