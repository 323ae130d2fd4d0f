//! TTL Cache demo
//!
//! Fills a cache with short-lived and permanent entries, then reports while the
//! passive expiry sampler drains the expired ones.

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttl_cache::{Cache, CacheConfig, CacheEvent};

/// Main entry point for the demo.
///
/// # Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache, which starts its sampler
/// 4. Write `DEMO_KEYS` entries, every other one without TTL
/// 5. Report stats until only permanent entries remain or Ctrl+C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ttl_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = CacheConfig::from_env()?;
    if config.default_ttl.is_none() {
        config.default_ttl = Some(Duration::from_secs(2));
    }
    let keys: usize = env::var("DEMO_KEYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(200);
    info!(
        "Configuration loaded: default_ttl={:?}, sample_size={}, cooldown={:?}, keys={}",
        config.default_ttl, config.sample_size, config.cooldown, keys
    );

    let cache: Cache<String> = Cache::new(config)?;

    let evicted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&evicted);
    cache.subscribe(move |event| {
        if let CacheEvent::Unset { key, .. } = event {
            counter.fetch_add(1, Ordering::Relaxed);
            debug!(key, "unset");
        }
        Ok(())
    });

    let mut permanent = 0;
    for i in 0..keys {
        let key = format!("key-{i}");
        let value = format!("value-{i}");
        if i % 2 == 0 {
            cache.set(key, value);
        } else {
            cache.set_with_ttl(key, value, Duration::ZERO);
            permanent += 1;
        }
    }
    info!("Wrote {} entries, {} without TTL", keys, permanent);

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = cache.stats();
                info!(
                    "entries={} evicted={} sampler_passes={} expirations={}",
                    stats.total_entries,
                    evicted.load(Ordering::Relaxed),
                    stats.sampler_passes,
                    stats.expirations
                );
                if stats.total_entries <= permanent {
                    info!("Only permanent entries remain");
                    break;
                }
                if !cache.passive_expiry_running() {
                    warn!("Sampler not running, cleaning explicitly");
                    cache.clean();
                }
            }
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
