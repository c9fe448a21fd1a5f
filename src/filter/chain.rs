use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    filter::rule::FilterRule,
    types::{CatalystItem, FilteredCatalyst},
};

pub const DEFAULT_RESONANCE_THRESHOLD: f64 = 0.3;
const RESONANCE_PATH_ROOT: &str = "resonance";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    pub items_filtered: u64,
    pub items_retained: u64,
    pub avg_aggregate_intensity: f64,
}

impl FilterStats {
    fn record(&mut self, filtered: &FilteredCatalyst) {
        self.items_filtered = self.items_filtered.saturating_add(1);
        if !filtered.is_empty() {
            self.items_retained = self.items_retained.saturating_add(1);
        }
        let count = self.items_filtered as f64;
        self.avg_aggregate_intensity = (self.avg_aggregate_intensity * (count - 1.0)
            + filtered.aggregate_intensity)
            / count;
    }
}

#[derive(Debug, Clone)]
pub struct FilterChain {
    rules: BTreeMap<String, FilterRule>,
    threshold: f64,
    stats: FilterStats,
}

impl FilterChain {
    pub fn new(threshold: f64) -> Self {
        Self {
            rules: BTreeMap::new(),
            threshold,
            stats: FilterStats::default(),
        }
    }

    pub fn with_rules(threshold: f64, rules: impl IntoIterator<Item = FilterRule>) -> Self {
        let mut chain = Self::new(threshold);
        for rule in rules {
            chain.add_rule(rule);
        }
        chain
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn rules(&self) -> &BTreeMap<String, FilterRule> {
        &self.rules
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Replaces any rule with the same name.
    pub fn add_rule(&mut self, rule: FilterRule) -> Option<FilterRule> {
        self.rules.insert(rule.name.clone(), rule)
    }

    pub fn remove_rule(&mut self, name: &str) -> Option<FilterRule> {
        self.rules.remove(name)
    }

    pub fn set_active(&mut self, name: &str, active: bool) -> bool {
        match self.rules.get_mut(name) {
            Some(rule) => {
                rule.active = active;
                true
            }
            None => false,
        }
    }

    /// Shifts every rule's sensitivity by `delta`, clamped to 0.0..=1.0.
    pub fn adjust_sensitivity(&mut self, delta: f64) {
        for rule in self.rules.values_mut() {
            rule.sensitivity = (rule.sensitivity + delta).clamp(0.0, 1.0);
        }
    }

    pub fn apply(&mut self, item: &CatalystItem) -> FilteredCatalyst {
        let filtered = resonance_filter(item, &self.rules, self.threshold);
        self.stats.record(&filtered);
        tracing::trace!(
            target: "filter",
            item_id = %item.id,
            retained = filtered.filtered_content.len(),
            aggregate_intensity = filtered.aggregate_intensity,
            "catalyst_filtered"
        );
        filtered
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new(DEFAULT_RESONANCE_THRESHOLD)
    }
}

/// Scores every payload field against the active rules and keeps the fields whose
/// accumulated score is strictly above `threshold`.
pub fn resonance_filter(
    item: &CatalystItem,
    rules: &BTreeMap<String, FilterRule>,
    threshold: f64,
) -> FilteredCatalyst {
    let mut filtered_content = BTreeMap::new();
    let mut attention_focus = BTreeMap::new();
    let mut attention_path = vec![RESONANCE_PATH_ROOT.to_string()];

    for (key, field) in &item.payload {
        let mut score = 0.0;
        let mut matched = Vec::new();
        for (name, rule) in rules {
            let contribution = rule.resonance_with(field);
            if contribution > 0.0 {
                score += contribution;
                matched.push(name);
            }
        }

        if score > threshold {
            filtered_content.insert(key.clone(), field.value.clone());
            attention_focus.insert(key.clone(), score.min(1.0));
            for name in matched {
                if !attention_path.iter().any(|step| step == name) {
                    attention_path.push(name.clone());
                }
            }
        }
    }

    let aggregate_intensity =
        attention_focus.values().sum::<f64>() / attention_focus.len().max(1) as f64;

    FilteredCatalyst {
        item_id: item.id.clone(),
        kind: item.kind.clone(),
        filtered_content,
        attention_focus,
        aggregate_intensity,
        attention_path,
        received_at: item.received_at,
    }
}
