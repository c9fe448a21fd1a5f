use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{PipelineError, validation_error},
    types::{CatalystItem, FieldTag},
};

#[async_trait]
pub trait CatalystSource: Send + Sync {
    /// `Ok(None)` means nothing arrived this cycle.
    async fn receive(&self) -> Result<Option<CatalystItem>, PipelineError>;
}

pub fn validate_item(item: &CatalystItem) -> Result<(), PipelineError> {
    if item.id.trim().is_empty() {
        return Err(validation_error("catalyst id cannot be empty"));
    }
    if item.kind.trim().is_empty() {
        return Err(validation_error(format!("catalyst {} has an empty kind", item.id)));
    }
    if item.payload.is_empty() {
        return Err(validation_error(format!("catalyst {} has an empty payload", item.id)));
    }
    if let Some(key) = item.payload.keys().find(|key| key.trim().is_empty()) {
        return Err(validation_error(format!(
            "catalyst {} has a blank payload key '{key}'",
            item.id
        )));
    }
    if !item.received_at.is_finite() || item.received_at < 0.0 {
        return Err(validation_error(format!(
            "catalyst {} has an invalid timestamp {}",
            item.id, item.received_at
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedField {
    pub key: String,
    #[serde(default)]
    pub tags: Vec<FieldTag>,
}

impl SimulatedField {
    pub fn new<I, T>(key: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldTag>,
    {
        Self {
            key: key.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn default_simulated_fields() -> Vec<SimulatedField> {
    vec![
        SimulatedField::new("temperature", ["ambient", "thermal"]),
        SimulatedField::new("motion", ["movement"]),
        SimulatedField::new("signal_strength", ["signal"]),
        SimulatedField::new("novelty", ["novelty", "signal"]),
    ]
}

/// Deterministic source that emits one item per call, with an idle call every
/// `idle_every` calls. Field values oscillate in 0.0..=1.0.
pub struct SimulatedSource {
    kind: String,
    fields: Vec<SimulatedField>,
    idle_every: u64,
    counter: std::sync::atomic::AtomicU64,
}

impl SimulatedSource {
    pub fn new(kind: impl Into<String>, fields: Vec<SimulatedField>, idle_every: u64) -> Self {
        Self {
            kind: kind.into(),
            fields,
            idle_every,
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    fn build_item(&self, n: u64) -> CatalystItem {
        let mut item = CatalystItem::new(uuid::Uuid::now_v7().to_string(), self.kind.clone())
            .with_metadata("sequence", json!(n));
        for (index, field) in self.fields.iter().enumerate() {
            let phase = (n as f64) * 0.37 + (index as f64) * 1.3;
            let value = 0.5 + 0.5 * phase.sin();
            item = item.with_field(field.key.clone(), json!(value), field.tags.iter().cloned());
        }
        item
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new("ambient", default_simulated_fields(), 0)
    }
}

#[async_trait]
impl CatalystSource for SimulatedSource {
    async fn receive(&self) -> Result<Option<CatalystItem>, PipelineError> {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            .saturating_add(1);
        if self.idle_every > 0 && n % self.idle_every == 0 {
            return Ok(None);
        }
        Ok(Some(self.build_item(n)))
    }
}
