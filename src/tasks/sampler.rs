//! Passive Expiry Sampler
//!
//! Background task that reads a random sample of keys so expired entries are
//! evicted without anyone asking for them. It removes nothing itself: every
//! eviction goes through the store's ordinary lazy-expiry read.

use std::sync::Weak;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::EntryStore;
use crate::config::CacheConfig;

// == Sampler Settings ==
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    /// Keys read per pass, also the minimum cache size worth sampling
    pub sample_size: usize,
    /// Expired fraction of a sample that triggers another pass
    pub expired_threshold: f64,
    /// Sleep after an active phase
    pub cooldown: Duration,
    /// Poll interval while the cache is below `sample_size`
    pub idle_poll: Duration,
}

impl From<&CacheConfig> for SamplerSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            sample_size: config.sample_size.max(1),
            expired_threshold: config.expired_threshold,
            cooldown: config.cooldown,
            idle_poll: config.idle_poll,
        }
    }
}

/// Spawns the sampler for `store` on `runtime`.
///
/// The task holds only a weak reference and exits on its own once the store
/// is dropped. The returned handle can abort it sooner.
pub fn spawn_sampler<V>(
    runtime: &Handle,
    store: Weak<EntryStore<V>>,
    settings: SamplerSettings,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    runtime.spawn(async move {
        info!(
            sample_size = settings.sample_size,
            cooldown_ms = settings.cooldown.as_millis() as u64,
            "starting passive expiry sampler"
        );
        run(store, settings).await;
        debug!("passive expiry sampler stopped, cache dropped");
    })
}

async fn run<V>(store: Weak<EntryStore<V>>, settings: SamplerSettings)
where
    V: Clone + Send + Sync + 'static,
{
    let mut rng = StdRng::from_entropy();

    loop {
        // Idle until there is enough to sample
        loop {
            let Some(strong) = store.upgrade() else {
                return;
            };
            if strong.len() >= settings.sample_size {
                break;
            }
            drop(strong);
            tokio::time::sleep(settings.idle_poll).await;
        }

        loop {
            let Some(strong) = store.upgrade() else {
                return;
            };
            let again = sample_pass(&strong, &settings, &mut rng);
            drop(strong);
            if !again {
                break;
            }
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(settings.cooldown).await;
    }
}

// == Sample Pass ==
/// Runs one pass over a random sample of keys.
///
/// Returns true when enough of the sample had expired that another pass is
/// likely to find more.
pub fn sample_pass<V, R>(store: &EntryStore<V>, settings: &SamplerSettings, rng: &mut R) -> bool
where
    V: Clone + Send + Sync + 'static,
    R: Rng + ?Sized,
{
    if store.len() < settings.sample_size {
        return false;
    }

    let mut keys = store.keys();
    let (sample, _) = keys.partial_shuffle(rng, settings.sample_size);
    let sampled = sample.len();
    let expired = sample
        .iter()
        .filter(|key| store.lookup(key, |_| ()).is_none())
        .count();
    store.stats().record_sampler_pass();

    debug!(sampled, expired, remaining = store.len(), "sampler pass");

    if sampled == 0 || store.is_empty() {
        return false;
    }
    expired as f64 >= settings.expired_threshold * sampled as f64
}
