//! Integration Tests for the Backing Store Contract
//!
//! A mirror-style backing store sees every event and serves local misses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ttl_cache::{Cache, CacheEvent, EventKind, Fetched, ReadThrough};

// == Test Backing Stores ==

/// Mirrors every mutation and serves reads from the mirror.
#[derive(Default)]
struct MirrorBacking {
    entries: Mutex<HashMap<String, (String, Option<DateTime<Utc>>)>>,
    fetches: AtomicUsize,
    unsets: Mutex<Vec<String>>,
}

impl MirrorBacking {
    fn seed(&self, key: &str, value: &str, expires_at: Option<DateTime<Utc>>) {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), expires_at));
    }

    fn holds(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl ReadThrough<String> for MirrorBacking {
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Fetched<String>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .map(|(value, expires_at)| Fetched::new(value.clone(), *expires_at)))
    }

    fn observe(&self, event: &CacheEvent<String>) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        match event {
            CacheEvent::Set {
                key,
                value,
                expires_at,
            } => {
                entries.insert(key.clone(), (value.clone(), *expires_at));
            }
            CacheEvent::Unset { key, .. } => {
                entries.remove(key);
                self.unsets.lock().push(key.clone());
            }
            CacheEvent::Clear => entries.clear(),
        }
        Ok(())
    }
}

struct FailingBacking;

#[async_trait]
impl ReadThrough<String> for FailingBacking {
    async fn fetch(&self, _key: &str) -> anyhow::Result<Option<Fetched<String>>> {
        anyhow::bail!("remote store unreachable")
    }

    fn observe(&self, _event: &CacheEvent<String>) -> anyhow::Result<()> {
        anyhow::bail!("remote store unreachable")
    }
}

struct SlowBacking;

#[async_trait]
impl ReadThrough<String> for SlowBacking {
    async fn fetch(&self, _key: &str) -> anyhow::Result<Option<Fetched<String>>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Some(Fetched::new("late".to_string(), None)))
    }
}

fn mirrored_cache() -> (Cache<String>, Arc<MirrorBacking>) {
    let backing = Arc::new(MirrorBacking::default());
    let shared: Arc<dyn ReadThrough<String>> = Arc::clone(&backing) as Arc<dyn ReadThrough<String>>;
    let cache = Cache::builder()
        .read_through_shared(shared)
        .build()
        .unwrap();
    (cache, backing)
}

// == Write-Through ==

#[tokio::test]
async fn test_mutations_reach_backing_store() {
    let (cache, backing) = mirrored_cache();

    cache.set("a", "1".to_string());
    cache.set("b", "2".to_string());
    assert!(backing.holds("a"));

    cache.unset("a");
    assert!(!backing.holds("a"));
    assert!(backing.holds("b"));

    cache.clear();
    assert!(!backing.holds("b"));
}

// == Read-Through ==

#[tokio::test]
async fn test_local_hit_skips_backing_store() {
    let (cache, backing) = mirrored_cache();
    cache.set("a", "1".to_string());

    assert_eq!(cache.load("a").await, Some("1".to_string()));
    assert_eq!(backing.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_miss_fills_from_backing_without_event() {
    let (cache, backing) = mirrored_cache();
    let expires_at = Utc::now() + chrono::Duration::seconds(60);
    backing.seed("remote", "from-afar", Some(expires_at));
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    cache.subscribe(move |event| {
        sink.lock().push(event.kind());
        Ok(())
    });

    assert_eq!(cache.load("remote").await, Some("from-afar".to_string()));

    // Now served locally, with the remote expiry
    assert_eq!(cache.get("remote"), Some("from-afar".to_string()));
    assert_eq!(cache.expires_at("remote"), Some(expires_at));
    assert_eq!(backing.fetches.load(Ordering::SeqCst), 1);
    assert!(kinds.lock().is_empty());
    assert_eq!(cache.stats().fills, 1);
}

#[tokio::test]
async fn test_expired_remote_entry_forces_unset() {
    let (cache, backing) = mirrored_cache();
    backing.seed("stale", "old", Some(Utc::now() - chrono::Duration::seconds(1)));
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    cache.subscribe(move |event| {
        sink.lock().push(event.clone());
        Ok(())
    });

    assert_eq!(cache.load("stale").await, None);

    // The local cache never held the key, the event fires anyway
    assert_eq!(
        *log.lock(),
        vec![CacheEvent::Unset {
            key: "stale".to_string(),
            value: None
        }]
    );
    assert!(!backing.holds("stale"));
    assert_eq!(cache.count(), 0);
}

#[tokio::test]
async fn test_locally_expired_entry_unsets_once() {
    let (cache, backing) = mirrored_cache();
    cache.set_with_ttl("k", "local".to_string(), Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Mirror still holds the stale copy because nothing read it locally yet
    assert!(backing.holds("k"));

    assert_eq!(cache.load("k").await, None);

    assert_eq!(*backing.unsets.lock(), vec!["k".to_string()]);
}

#[tokio::test]
async fn test_total_miss_falls_back_to_default() {
    let (cache, backing) = mirrored_cache();

    assert_eq!(cache.load_or_else("nowhere", || "D".to_string()).await, "D");
    assert_eq!(cache.count(), 0);

    assert_eq!(cache.load_or_insert_with("nowhere", || "P".to_string()).await, "P");
    assert_eq!(cache.get("nowhere"), Some("P".to_string()));
    // Persisting the default is a real write and reaches the mirror
    assert!(backing.holds("nowhere"));
}

#[tokio::test]
async fn test_backing_failure_is_a_miss() {
    let cache: Cache<String> = Cache::builder().read_through(FailingBacking).build().unwrap();

    cache.set("k", "v".to_string());
    assert_eq!(cache.get("k"), Some("v".to_string()));
    assert_eq!(cache.load("missing").await, None);
    assert_eq!(cache.load_or_else("missing", || "D".to_string()).await, "D");
    assert_eq!(cache.count(), 1);
}

#[tokio::test]
async fn test_backing_timeout_is_a_miss() {
    let cache: Cache<String> = Cache::builder()
        .read_through(SlowBacking)
        .read_through_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    assert_eq!(cache.load("k").await, None);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(cache.count(), 0);
}

#[tokio::test]
async fn test_load_without_backing_matches_get() {
    let cache: Cache<String> = Cache::without_ttl();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    cache.subscribe(move |event| {
        sink.lock().push(event.kind());
        Ok(())
    });

    assert_eq!(cache.load("k").await, None);
    assert_eq!(cache.load_or_insert_with("k", || "v".to_string()).await, "v");
    assert_eq!(cache.load("k").await, Some("v".to_string()));
    assert_eq!(*kinds.lock(), vec![EventKind::Set]);
}
