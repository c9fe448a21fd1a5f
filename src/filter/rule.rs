use serde::{Deserialize, Serialize};

use crate::types::{FieldTag, PayloadField};

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub name: String,
    /// Tie-break weight, 0.0..=1.0.
    pub priority: f64,
    /// 0.0..=1.0.
    pub sensitivity: f64,
    #[serde(default)]
    pub resonance_tags: Vec<FieldTag>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl FilterRule {
    pub fn new<I, T>(name: impl Into<String>, priority: f64, sensitivity: f64, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldTag>,
    {
        Self {
            name: name.into(),
            priority,
            sensitivity,
            resonance_tags: tags.into_iter().map(Into::into).collect(),
            active: true,
        }
    }

    pub fn weight(&self) -> f64 {
        self.sensitivity * self.priority
    }

    /// Score this rule contributes to `field`: one weight per matching tag.
    pub fn resonance_with(&self, field: &PayloadField) -> f64 {
        if !self.active {
            return 0.0;
        }
        let matches = self
            .resonance_tags
            .iter()
            .filter(|tag| field.has_tag(tag))
            .count();
        matches as f64 * self.weight()
    }
}
