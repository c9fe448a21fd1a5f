use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::CatalystItem;

/// Minimum bar a validated catalyst must clear before it reaches the filter.
///
/// Every field named in `min_values` must be present with a numeric value of at
/// least the minimum. Every field in `required_flags` must be present and `true`.
/// An empty policy accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptancePolicy {
    #[serde(default)]
    pub min_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub required_flags: Vec<String>,
}

impl AcceptancePolicy {
    pub fn with_min_value(mut self, field: impl Into<String>, minimum: f64) -> Self {
        self.min_values.insert(field.into(), minimum);
        self
    }

    pub fn with_required_flag(mut self, field: impl Into<String>) -> Self {
        self.required_flags.push(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.min_values.is_empty() && self.required_flags.is_empty()
    }

    /// The first field that keeps `item` out, or `None` when it is accepted.
    pub fn declined_by<'a>(&'a self, item: &CatalystItem) -> Option<&'a str> {
        let value_of = |field: &str| item.payload.get(field).map(|payload| &payload.value);

        for (field, minimum) in &self.min_values {
            match value_of(field.as_str()).and_then(Value::as_f64) {
                Some(value) if value >= *minimum => {}
                _ => return Some(field.as_str()),
            }
        }
        self.required_flags
            .iter()
            .find(|field| value_of(field.as_str()).and_then(Value::as_bool) != Some(true))
            .map(String::as_str)
    }

    pub fn accepts(&self, item: &CatalystItem) -> bool {
        self.declined_by(item).is_none()
    }
}
