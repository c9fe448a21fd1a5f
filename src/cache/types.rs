use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: Duration,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.stored_at)
    }

    pub fn is_valid(&self, now: Duration) -> bool {
        self.age(now) <= self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Fetched during this call.
    Fresh,
    /// Served from a still-valid entry.
    Cached,
    /// Served from an expired entry, either because no fetch fn was given or the fetch failed.
    Stale,
    /// Nothing cached; the empty default for the key was returned.
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead {
    pub value: Value,
    pub source: CacheSource,
    pub error: Option<PipelineError>,
}

impl CacheRead {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub default_ttl: Duration,
    pub overrides: BTreeMap<String, Duration>,
}

impl TtlPolicy {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.overrides.insert(key.into(), ttl);
        self
    }

    pub fn ttl_for(&self, key: &str) -> Duration {
        self.overrides.get(key).copied().unwrap_or(self.default_ttl)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// `[]` for keys naming a list, `{}` for everything else.
pub fn empty_default_for(key: &str) -> Value {
    if key.contains("list") {
        Value::Array(Vec::new())
    } else {
        Value::Object(serde_json::Map::new())
    }
}
