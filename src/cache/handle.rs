//! Cache Facade
//!
//! Public entry point: default TTL resolution, the default-on-miss read
//! contract, subscriptions, the optional read-through collaborator and the
//! passive expiry sampler's lifecycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backing::{Fetched, ReadThrough};
use crate::cache::{is_past, CacheStats, EntryStore};
use crate::config::{normalize_ttl, CacheConfig};
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, EventWaiter, Subscription};
use crate::tasks::{spawn_sampler, SamplerSettings};

// == Cache Builder ==
/// Configures and creates a [`Cache`].
pub struct CacheBuilder<V> {
    config: CacheConfig,
    read_through: Option<Arc<dyn ReadThrough<V>>>,
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            read_through: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// TTL for writes without an explicit one. Zero means no TTL.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = normalize_ttl(ttl);
        self
    }

    /// Forces the passive expiry sampler on or off.
    pub fn passive_expiry(mut self, enabled: bool) -> Self {
        self.config.passive_expiry = Some(enabled);
        self
    }

    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.config.sample_size = sample_size;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    pub fn idle_poll(mut self, idle_poll: Duration) -> Self {
        self.config.idle_poll = idle_poll;
        self
    }

    /// Attaches a backing store consulted on misses by the `load*` methods
    /// and shown every event.
    pub fn read_through(mut self, backing: impl ReadThrough<V> + 'static) -> Self {
        self.read_through = Some(Arc::new(backing));
        self
    }

    /// Same as [`read_through`](Self::read_through) for an already shared backing store.
    pub fn read_through_shared(mut self, backing: Arc<dyn ReadThrough<V>>) -> Self {
        self.read_through = Some(backing);
        self
    }

    pub fn read_through_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_through_timeout = timeout;
        self
    }

    // == Build ==
    /// Creates the cache and, when passive expiry is enabled, its sampler.
    ///
    /// # Errors
    /// `CacheError::InvalidConfig` for a zero sample size, and
    /// `CacheError::Runtime` when passive expiry was explicitly requested
    /// outside a tokio runtime. Passive expiry enabled only implicitly by a
    /// default TTL is skipped with a warning instead.
    pub fn build(self) -> Result<Cache<V>> {
        if self.config.sample_size == 0 {
            return Err(CacheError::InvalidConfig(
                "sample_size must be positive".to_string(),
            ));
        }
        if self.config.passive_expiry == Some(true) {
            if let Err(err) = Handle::try_current() {
                return Err(CacheError::Runtime(format!(
                    "passive expiry needs a tokio runtime: {err}"
                )));
            }
        }
        Ok(self.assemble())
    }

    /// Wires the store, backing observer and sampler. Never fails: a sampler
    /// that cannot start is skipped with a warning.
    fn assemble(self) -> Cache<V> {
        let config = self.config;
        let store = Arc::new(EntryStore::new());

        if let Some(backing) = &self.read_through {
            let observer = Arc::clone(backing);
            store
                .notifier()
                .subscribe(move |event| observer.observe(event));
        }

        let sampler = if config.passive_expiry_enabled() {
            match Handle::try_current() {
                Ok(runtime) => Some(spawn_sampler(
                    &runtime,
                    Arc::downgrade(&store),
                    SamplerSettings::from(&config),
                )),
                Err(_) => {
                    warn!("no tokio runtime, passive expiry disabled for this cache");
                    None
                }
            }
        } else {
            None
        };

        Cache {
            store,
            default_ttl: config.default_ttl,
            read_through: self.read_through,
            read_through_timeout: config.read_through_timeout,
            sampler,
        }
    }
}

impl<V> Default for CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// == Cache ==
/// An in-process key-value cache with per-entry TTL.
///
/// Share it behind an `Arc`. Dropping the last handle stops its sampler.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use ttl_cache::Cache;
///
/// let cache: Cache<String> = Cache::without_ttl();
/// cache.set("greeting", "hello".to_string());
/// assert_eq!(cache.get("greeting"), Some("hello".to_string()));
///
/// cache.set_with_ttl("flash", "gone soon".to_string(), Duration::from_millis(10));
/// std::thread::sleep(Duration::from_millis(20));
/// assert_eq!(cache.get("flash"), None);
/// ```
pub struct Cache<V> {
    store: Arc<EntryStore<V>>,
    default_ttl: Option<Duration>,
    read_through: Option<Arc<dyn ReadThrough<V>>>,
    read_through_timeout: Duration,
    sampler: Option<JoinHandle<()>>,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    pub fn builder() -> CacheBuilder<V> {
        CacheBuilder::new()
    }

    /// Creates a cache from a full configuration.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Creates a cache whose writes expire after `ttl` unless told otherwise.
    ///
    /// The sampler starts if a tokio runtime is available, otherwise it is
    /// skipped with a warning.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self::builder().default_ttl(ttl).assemble()
    }

    /// Creates a cache whose entries only expire when written with a TTL.
    pub fn without_ttl() -> Self {
        Self::builder().assemble()
    }

    // == Writes ==
    /// Stores `value` under `key` with the default TTL.
    ///
    /// Returns the expiration instant, None if the entry never expires.
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<DateTime<Utc>> {
        self.store.set(key.into(), value, self.default_ttl)
    }

    /// Stores `value` with its own TTL. A zero `ttl` never expires.
    pub fn set_with_ttl(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
    ) -> Option<DateTime<Utc>> {
        self.store.set(key.into(), value, Some(ttl))
    }

    /// Removes `key` regardless of expiry, returning what was stored.
    pub fn unset(&self, key: &str) -> Option<V> {
        self.store.unset(key)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.store.clear()
    }

    /// Evicts every expired entry now, returning how many were removed.
    pub fn clean(&self) -> usize {
        let evicted = self.store.clean();
        debug!(evicted, "clean pass");
        evicted
    }

    // == Reads ==
    /// Returns the live value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.store.lookup(key, V::clone);
        match value {
            Some(_) => self.store.stats().record_hit(),
            None => self.store.stats().record_miss(),
        }
        value
    }

    /// Returns the live value or `default`. Nothing is stored.
    pub fn get_or(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    /// Returns the live value or computes one. Nothing is stored.
    pub fn get_or_else(&self, key: &str, default: impl FnOnce() -> V) -> V {
        self.get(key).unwrap_or_else(default)
    }

    /// Returns the live value, or stores `default` with the default TTL.
    pub fn get_or_insert(&self, key: &str, default: V) -> V {
        self.get_or_insert_with(key, || default)
    }

    /// Returns the live value, or computes one and stores it with the default TTL.
    pub fn get_or_insert_with(&self, key: &str, default: impl FnOnce() -> V) -> V {
        match self.get(key) {
            Some(value) => value,
            None => self.persist(key, default()),
        }
    }

    /// Whether `key` holds a live value. Never evicts.
    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    /// Expiration instant of a live entry, None if absent or never expiring.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.store.expires_at(key)
    }

    // == Read-Through ==
    /// Like [`get`](Self::get), then asks the backing store on a local miss.
    ///
    /// Backing store failures and timeouts are logged and treated as a miss.
    pub async fn load(&self, key: &str) -> Option<V> {
        if let Some(value) = self.get(key) {
            return Some(value);
        }
        self.fetch_remote(key).await
    }

    /// Like [`load`](Self::load), falling back to a computed value. Nothing is stored.
    pub async fn load_or_else(&self, key: &str, default: impl FnOnce() -> V) -> V {
        self.load(key).await.unwrap_or_else(default)
    }

    /// Like [`load`](Self::load), storing a computed value on a total miss.
    pub async fn load_or_insert_with(&self, key: &str, default: impl FnOnce() -> V) -> V {
        match self.load(key).await {
            Some(value) => value,
            None => self.persist(key, default()),
        }
    }

    async fn fetch_remote(&self, key: &str) -> Option<V> {
        let backing = self.read_through.as_ref()?;

        let attempt = tokio::time::timeout(self.read_through_timeout, backing.fetch(key));
        let fetched = match attempt.await {
            Ok(Ok(fetched)) => fetched?,
            Ok(Err(err)) => {
                let err = CacheError::backing(format!("{err:#}"));
                warn!(key, error = %err, "read-through failed, treating as miss");
                return None;
            }
            Err(_) => {
                let err = CacheError::backing(format!(
                    "timed out after {}ms",
                    self.read_through_timeout.as_millis()
                ));
                warn!(key, error = %err, "read-through failed, treating as miss");
                return None;
            }
        };

        let Fetched { value, expires_at } = fetched;
        if is_past(expires_at, Utc::now()) {
            self.store.retire(key);
            return None;
        }
        Some(self.store.fill(key, value, expires_at))
    }

    fn persist(&self, key: &str, value: V) -> V {
        self.store.set(key.to_string(), value.clone(), self.default_ttl);
        value
    }

    // == Events ==
    /// Registers `callback` for every future Set, Unset and Clear.
    ///
    /// Callbacks run synchronously inside the mutating call. Errors and panics
    /// are logged and do not affect the call or other subscribers.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent<V>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.store.notifier().subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.store.notifier().unsubscribe(subscription)
    }

    /// Registers for the next event now, to be awaited later.
    pub fn waiter(&self) -> EventWaiter<V> {
        self.store.notifier().waiter()
    }

    /// Resolves with the first event fired after this call.
    ///
    /// Registration happens before the future is first polled. Resolves to
    /// None if the cache is dropped first.
    pub fn wait_for_next_event(
        &self,
    ) -> impl Future<Output = Option<CacheEvent<V>>> + Send + 'static {
        self.waiter().recv()
    }

    // == Inspection ==
    /// Number of entries held, including expired ones not yet evicted.
    pub fn count(&self) -> usize {
        self.store.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Whether this cache's sampler task is alive.
    pub fn passive_expiry_running(&self) -> bool {
        self.sampler
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats().snapshot(self.store.len())
    }
}

impl<V> Default for Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::without_ttl()
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.abort();
        }
    }
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("default_ttl", &self.default_ttl)
            .field("read_through", &self.read_through.is_some())
            .field("sampler", &self.sampler.is_some())
            .finish_non_exhaustive()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use parking_lot::Mutex;
    use std::cell::Cell;
    use std::thread::sleep;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn test_set_without_ttl_never_expires() {
        let cache: Cache<String> = Cache::without_ttl();

        assert!(cache.set("a", "v".to_string()).is_none());
        sleep(SHORT);
        assert_eq!(cache.get("a"), Some("v".to_string()));
    }

    #[test]
    fn test_default_ttl_applies_to_set() {
        let cache: Cache<&str> = Cache::with_default_ttl(SHORT);

        assert!(cache.set("a", "v").is_some());
        assert_eq!(cache.get("a"), Some("v"));

        sleep(SHORT * 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_ttl_override_beats_default() {
        let cache: Cache<&str> = Cache::with_default_ttl(Duration::from_secs(60));

        cache.set_with_ttl("short", "v", SHORT);
        assert!(cache.set_with_ttl("forever", "v", Duration::ZERO).is_none());
        sleep(SHORT * 2);

        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("forever"), Some("v"));
    }

    #[test]
    fn test_rewrite_replaces_expiry() {
        let cache: Cache<u32> = Cache::without_ttl();

        cache.set_with_ttl("k", 1, SHORT);
        cache.set_with_ttl("k", 2, Duration::from_secs(60));
        sleep(SHORT * 2);
        assert_eq!(cache.get("k"), Some(2));

        cache.set_with_ttl("k", 3, SHORT);
        sleep(SHORT * 2);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_get_or_does_not_store() {
        let cache: Cache<&str> = Cache::without_ttl();

        assert_eq!(cache.get_or("missing", "D"), "D");
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_get_or_insert_persists_with_default_ttl() {
        let cache: Cache<&str> = Cache::with_default_ttl(SHORT);

        assert_eq!(cache.get_or_insert("missing", "D"), "D");
        assert_eq!(cache.get("missing"), Some("D"));
        assert!(cache.expires_at("missing").is_some());

        sleep(SHORT * 2);
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_get_or_else_invokes_once_per_miss() {
        let cache: Cache<u32> = Cache::without_ttl();
        let calls = Cell::new(0);

        let value = cache.get_or_else("k", || {
            calls.set(calls.get() + 1);
            7
        });
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 1);

        cache.set("k", 1);
        assert_eq!(cache.get_or_else("k", || unreachable!()), 1);
    }

    #[test]
    fn test_get_or_insert_with_fires_set() {
        let cache: Cache<u32> = Cache::without_ttl();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        cache.subscribe(move |event| {
            sink.lock().push(event.kind());
            Ok(())
        });

        assert_eq!(cache.get_or_insert_with("k", || 9), 9);
        assert_eq!(cache.get_or_insert_with("k", || 10), 9);

        assert_eq!(*kinds.lock(), vec![EventKind::Set]);
    }

    #[test]
    fn test_hit_does_not_fire() {
        let cache: Cache<u32> = Cache::without_ttl();
        cache.set("k", 1);
        let fired = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&fired);
        cache.subscribe(move |_| {
            *sink.lock() += 1;
            Ok(())
        });

        cache.get("k");
        cache.get("k");
        assert_eq!(*fired.lock(), 0);
    }

    #[test]
    fn test_unset_and_clear() {
        let cache: Cache<u32> = Cache::without_ttl();
        cache.set("a", 1);
        cache.set("b", 2);

        assert_eq!(cache.unset("a"), Some(1));
        assert_eq!(cache.unset("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clean_counts_evictions() {
        let cache: Cache<u32> = Cache::without_ttl();
        cache.set_with_ttl("a", 1, SHORT);
        cache.set_with_ttl("b", 2, SHORT);
        cache.set("c", 3);
        sleep(SHORT * 2);

        assert_eq!(cache.count(), 3);
        assert_eq!(cache.clean(), 2);
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.clean(), 0);
    }

    #[test]
    fn test_stats_track_reads() {
        let cache: Cache<u32> = Cache::without_ttl();
        cache.set("a", 1);
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_build_without_runtime() {
        // Implicit passive expiry is skipped outside a runtime
        let cache: Cache<u32> = Cache::builder().default_ttl(SHORT).build().unwrap();
        assert!(!cache.passive_expiry_running());

        // Explicit passive expiry is an error
        let result: Result<Cache<u32>> = Cache::builder().passive_expiry(true).build();
        assert!(matches!(result, Err(CacheError::Runtime(_))));
    }

    #[test]
    fn test_with_default_ttl_outside_runtime() {
        let cache: Cache<u32> = Cache::with_default_ttl(SHORT);
        assert_eq!(cache.default_ttl(), Some(SHORT));
        assert!(!cache.passive_expiry_running());
    }

    #[tokio::test]
    async fn test_with_default_ttl_starts_sampler() {
        let cache: Cache<u32> = Cache::with_default_ttl(Duration::from_secs(1));
        assert!(cache.passive_expiry_running());

        let permanent: Cache<u32> = Cache::with_default_ttl(Duration::ZERO);
        assert_eq!(permanent.default_ttl(), None);
        assert!(!permanent.passive_expiry_running());
    }

    #[test]
    fn test_build_rejects_zero_sample_size() {
        let result: Result<Cache<u32>> = Cache::builder().sample_size(0).build();
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_without_backing_behaves_like_get() {
        let cache: Cache<u32> = Cache::without_ttl();
        cache.set("k", 1);

        assert_eq!(tokio_test::block_on(cache.load("k")), Some(1));
        assert_eq!(tokio_test::block_on(cache.load_or_else("m", || 2)), 2);
        assert_eq!(tokio_test::block_on(cache.load_or_insert_with("m", || 3)), 3);
        assert_eq!(cache.get("m"), Some(3));
    }

    #[tokio::test]
    async fn test_sampler_lifecycle() {
        let cache: Cache<u32> = Cache::builder()
            .default_ttl(Duration::from_secs(1))
            .build()
            .unwrap();
        assert!(cache.passive_expiry_running());

        let quiet: Cache<u32> = Cache::builder()
            .default_ttl(Duration::from_secs(1))
            .passive_expiry(false)
            .build()
            .unwrap();
        assert!(!quiet.passive_expiry_running());

        let opted_in: Cache<u32> = Cache::builder().passive_expiry(true).build().unwrap();
        assert!(opted_in.passive_expiry_running());
    }

    #[tokio::test]
    async fn test_wait_for_next_event() {
        let cache: Cache<u32> = Cache::without_ttl();
        let next = cache.wait_for_next_event();

        cache.set("k", 5);
        cache.unset("k");

        let event = next.await.unwrap();
        assert_eq!(event.kind(), EventKind::Set);
        assert_eq!(event.key(), Some("k"));
        assert_eq!(event.value(), Some(&5));
    }

    #[tokio::test]
    async fn test_wait_sees_first_of_many_events() {
        let cache: Cache<u32> = Cache::without_ttl();
        let next = cache.wait_for_next_event();

        for i in 0..300 {
            cache.set(format!("k{i}"), i);
        }

        let event = next.await.unwrap();
        assert_eq!(event.key(), Some("k0"));
        assert_eq!(event.value(), Some(&0));
    }

    #[tokio::test]
    async fn test_wait_returns_none_after_drop() {
        let cache: Cache<u32> = Cache::without_ttl();
        let next = cache.wait_for_next_event();
        drop(cache);

        assert!(next.await.is_none());
    }
}
