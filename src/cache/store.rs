use std::{
    collections::BTreeMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde_json::Value;

use crate::{
    cache::types::{CacheEntry, CacheRead, CacheSource, TtlPolicy, empty_default_for},
    clock::Clock,
    error::PipelineError,
    observability::metrics::record_cache_fetch_failure,
};

enum Lookup {
    Valid(Value),
    Expired(Value),
    Missing,
}

/// Key/value cache with per-key TTL.
///
/// Writes go through a single mutex. Concurrent misses on the same key are not
/// coalesced; each caller runs its own fetch.
pub struct TtlCache {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(policy: TtlPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn ttl_for(&self, key: &str) -> Duration {
        self.policy.ttl_for(key)
    }

    pub fn get<F>(&self, key: &str, fetch: Option<F>, force: bool) -> CacheRead
    where
        F: FnOnce() -> Result<Value, PipelineError>,
    {
        let lookup = self.lookup(key);
        if let (Lookup::Valid(value), false) = (&lookup, force) {
            return CacheRead {
                value: value.clone(),
                source: CacheSource::Cached,
                error: None,
            };
        }

        let Some(fetch) = fetch else {
            return Self::without_refresh(key, lookup);
        };

        match fetch() {
            Ok(value) => {
                self.set(key, value.clone());
                CacheRead {
                    value,
                    source: CacheSource::Fresh,
                    error: None,
                }
            }
            Err(err) => Self::after_failed_fetch(key, lookup, err),
        }
    }

    /// Same contract as [`TtlCache::get`] for an async fetch. The lock is not held
    /// while the fetch is pending.
    pub async fn get_with<F, Fut>(&self, key: &str, fetch: F, force: bool) -> CacheRead
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, PipelineError>>,
    {
        let lookup = self.lookup(key);
        if let (Lookup::Valid(value), false) = (&lookup, force) {
            return CacheRead {
                value: value.clone(),
                source: CacheSource::Cached,
                error: None,
            };
        }

        match fetch().await {
            Ok(value) => {
                self.set(key, value.clone());
                CacheRead {
                    value,
                    source: CacheSource::Fresh,
                    error: None,
                }
            }
            Err(err) => Self::after_failed_fetch(key, lookup, err),
        }
    }

    /// Read without fetching.
    pub fn read(&self, key: &str) -> CacheRead {
        self.get(key, None::<fn() -> Result<Value, PipelineError>>, false)
    }

    pub fn set(&self, key: &str, value: Value) {
        let now = self.clock.now();
        self.set_at(key, value, now);
    }

    pub fn set_at(&self, key: &str, value: Value, stored_at: Duration) {
        let ttl = self.policy.ttl_for(key);
        self.lock().insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                stored_at,
                ttl,
            },
        );
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    pub fn is_valid(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.lock()
            .get(key)
            .is_some_and(|entry| entry.is_valid(now))
    }

    /// Removes every key containing `pattern`, ignoring case.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let needle = pattern.to_lowercase();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.to_lowercase().contains(&needle));
        let removed = before - entries.len();
        tracing::debug!(
            target: "cache",
            pattern = pattern,
            removed = removed,
            "cache_pattern_invalidated"
        );
        removed
    }

    pub fn expired_keys(&self) -> Vec<String> {
        let now = self.clock.now();
        self.lock()
            .values()
            .filter(|entry| !entry.is_valid(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lookup(&self, key: &str) -> Lookup {
        let now = self.clock.now();
        match self.lock().get(key) {
            Some(entry) if entry.is_valid(now) => Lookup::Valid(entry.value.clone()),
            Some(entry) => Lookup::Expired(entry.value.clone()),
            None => Lookup::Missing,
        }
    }

    fn without_refresh(key: &str, lookup: Lookup) -> CacheRead {
        match lookup {
            Lookup::Valid(value) => CacheRead {
                value,
                source: CacheSource::Cached,
                error: None,
            },
            Lookup::Expired(value) => CacheRead {
                value,
                source: CacheSource::Stale,
                error: None,
            },
            Lookup::Missing => CacheRead {
                value: empty_default_for(key),
                source: CacheSource::Default,
                error: None,
            },
        }
    }

    fn after_failed_fetch(key: &str, lookup: Lookup, err: PipelineError) -> CacheRead {
        let err = match err.key {
            Some(_) => err,
            None => err.with_key(key),
        };
        tracing::warn!(
            target: "cache",
            key = key,
            error = %err,
            "cache_fetch_failed"
        );
        record_cache_fetch_failure(key);

        match lookup {
            Lookup::Valid(value) | Lookup::Expired(value) => CacheRead {
                value,
                source: CacheSource::Stale,
                error: Some(err),
            },
            Lookup::Missing => CacheRead {
                value: empty_default_for(key),
                source: CacheSource::Default,
                error: Some(err),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
