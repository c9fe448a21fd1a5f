use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{
    cache::{CacheSource, TtlCache},
    driver::{CycleContext, LoopWork},
    error::{PipelineError, fetch_error},
    observability::metrics::record_cache_update_published,
};

pub const DEFAULT_UPDATE_CAPACITY: usize = 64;

/// External collaborator the cache pulls named values from.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Value, PipelineError>;
}

/// Reads `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DataSource for JsonDirSource {
    async fn fetch(&self, key: &str) -> Result<Value, PipelineError> {
        let path = self.dir.join(format!("{key}.json"));
        let content = tokio::fs::read_to_string(&path).await.map_err(|err| {
            fetch_error(format!("failed to read {}: {err}", path.display())).with_key(key)
        })?;
        serde_json::from_str(&content).map_err(|err| {
            fetch_error(format!("failed to parse {}: {err}", path.display())).with_key(key)
        })
    }
}

/// In-memory source whose answers can be swapped at runtime.
#[derive(Debug, Default)]
pub struct StaticDataSource {
    answers: Mutex<BTreeMap<String, Result<Value, PipelineError>>>,
    calls: Mutex<BTreeMap<String, u64>>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.answers_lock().insert(key.into(), Ok(value));
    }

    pub fn fail(&self, key: impl Into<String>, message: impl Into<String>) {
        let key = key.into();
        let err = fetch_error(message).with_key(key.clone());
        self.answers_lock().insert(key, Err(err));
    }

    pub fn calls(&self, key: &str) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn answers_lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Result<Value, PipelineError>>> {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, key: &str) -> Result<Value, PipelineError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key.to_string())
            .or_insert(0) += 1;

        match self.answers_lock().get(key) {
            Some(answer) => answer.clone(),
            None => Err(fetch_error("no value registered").with_key(key)),
        }
    }
}

/// Published after every refresh cycle that touched at least one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheUpdate {
    pub cycle: u64,
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

/// Re-fetches every tracked key that is missing or past its TTL.
pub struct CacheRefreshWork {
    cache: Arc<TtlCache>,
    source: Arc<dyn DataSource>,
    keys: Vec<String>,
    updates: broadcast::Sender<CacheUpdate>,
}

impl CacheRefreshWork {
    pub fn new(cache: Arc<TtlCache>, source: Arc<dyn DataSource>, keys: Vec<String>) -> Self {
        let (updates, _receiver) = broadcast::channel(DEFAULT_UPDATE_CAPACITY);
        Self {
            cache,
            source,
            keys,
            updates,
        }
    }

    /// Receivers that fall more than [`DEFAULT_UPDATE_CAPACITY`] updates behind
    /// see `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates.subscribe()
    }

    pub fn update_sender(&self) -> broadcast::Sender<CacheUpdate> {
        self.updates.clone()
    }

    fn publish(&self, update: CacheUpdate) {
        // No subscribers is not an error.
        let delivered = self.updates.send(update).unwrap_or(0);
        record_cache_update_published(delivered);
    }
}

#[async_trait]
impl LoopWork for CacheRefreshWork {
    async fn run_cycle(&mut self, ctx: CycleContext) -> Result<(), PipelineError> {
        let mut failed = Vec::new();
        let mut refreshed = Vec::new();

        for key in &self.keys {
            if self.cache.is_valid(key) {
                continue;
            }
            let source = Arc::clone(&self.source);
            let read = self
                .cache
                .get_with(key, || async move { source.fetch(key).await }, false)
                .await;
            match read.source {
                CacheSource::Fresh => refreshed.push(key.clone()),
                CacheSource::Stale | CacheSource::Default | CacheSource::Cached => {
                    if read.error.is_some() {
                        failed.push(key.clone());
                    }
                }
            }
        }

        if !refreshed.is_empty() {
            tracing::debug!(
                target: "refresher",
                cycle = ctx.cycle,
                refreshed = refreshed.len(),
                "cache_keys_refreshed"
            );
        }

        let outcome = if failed.is_empty() {
            Ok(())
        } else {
            Err(fetch_error(format!(
                "{} of {} cache refreshes failed: {}",
                failed.len(),
                self.keys.len(),
                failed.join(", ")
            )))
        };

        if !refreshed.is_empty() || !failed.is_empty() {
            self.publish(CacheUpdate {
                cycle: ctx.cycle,
                refreshed,
                failed,
            });
        }
        outcome
    }
}
