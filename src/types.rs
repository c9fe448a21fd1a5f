use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type CatalystId = String;
pub type CycleId = u64;

/// Structured tag attached to a payload field. Stored lowercased and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldTag(String);

impl FieldTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FieldTag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for FieldTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<FieldTag> for String {
    fn from(value: FieldTag) -> Self {
        value.0
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadField {
    pub value: Value,
    #[serde(default)]
    pub tags: BTreeSet<FieldTag>,
}

impl PayloadField {
    pub fn new<I, T>(value: Value, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldTag>,
    {
        Self {
            value,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_tag(&self, tag: &FieldTag) -> bool {
        self.tags.contains(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalystItem {
    pub id: CatalystId,
    pub kind: String,
    #[serde(default)]
    pub payload: BTreeMap<String, PayloadField>,
    /// Wall-clock seconds since the unix epoch.
    pub received_at: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl CatalystItem {
    pub fn new(id: impl Into<CatalystId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload: BTreeMap::new(),
            received_at: unix_now_secs(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_field<I, T>(mut self, key: impl Into<String>, value: Value, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldTag>,
    {
        self.payload.insert(key.into(), PayloadField::new(value, tags));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredCatalyst {
    pub item_id: CatalystId,
    pub kind: String,
    pub filtered_content: BTreeMap<String, Value>,
    pub attention_focus: BTreeMap<String, f64>,
    pub aggregate_intensity: f64,
    pub attention_path: Vec<String>,
    pub received_at: f64,
}

impl FilteredCatalyst {
    pub fn is_empty(&self) -> bool {
        self.filtered_content.is_empty()
    }
}

pub fn unix_now_secs() -> f64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    nanos as f64 / 1_000_000_000.0
}
