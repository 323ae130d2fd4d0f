//! Named Cache Registry
//!
//! Hands out one shared cache per name so unrelated call sites can use the
//! same instance.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::error::Result;

static SHARED: Lazy<Registry<Value>> = Lazy::new(Registry::new);

// == Registry ==
/// Lookup-or-create table from name to cache.
pub struct Registry<V> {
    caches: Mutex<HashMap<String, Arc<Cache<V>>>>,
}

impl<V> Registry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cache registered under `name`, creating it from `config`
    /// on first use. Later calls ignore `config`.
    pub fn get_or_create(
        &self,
        name: &str,
        config: impl FnOnce() -> CacheConfig,
    ) -> Result<Arc<Cache<V>>> {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(name) {
            return Ok(Arc::clone(cache));
        }

        let cache = Arc::new(Cache::new(config())?);
        caches.insert(name.to_string(), Arc::clone(&cache));
        debug!(name, "registered shared cache");
        Ok(cache)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cache<V>>> {
        self.caches.lock().get(name).cloned()
    }

    /// Forgets `name`. The cache lives on while other handles exist.
    pub fn remove(&self, name: &str) -> Option<Arc<Cache<V>>> {
        self.caches.lock().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.lock().keys().cloned().collect()
    }
}

impl<V> Default for Registry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide JSON cache registered under `name`, created without a TTL.
pub fn shared(name: &str) -> Result<Arc<Cache<Value>>> {
    SHARED.get_or_create(name, CacheConfig::default)
}

/// Process-wide JSON cache registered under `name`, created from `config`
/// if it does not exist yet.
pub fn shared_with(name: &str, config: CacheConfig) -> Result<Arc<Cache<Value>>> {
    SHARED.get_or_create(name, || config)
}
