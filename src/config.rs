use std::{
    collections::BTreeMap,
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    cache::TtlPolicy,
    driver::{DEFAULT_BACKOFF_MULTIPLIER, LoopSpec, MissedTick},
    error::{PipelineError, validation_error},
    filter::{DEFAULT_RESONANCE_THRESHOLD, FilterRule},
    receiver::{AcceptancePolicy, SimulatedField, default_simulated_fields},
};

pub const RECEIVER_SUBSYSTEM: &str = "receiver";
pub const PROCESSOR_SUBSYSTEM: &str = "processor";
pub const CACHE_REFRESH_SUBSYSTEM: &str = "cache_refresh";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub subsystems: SubsystemsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

fn default_cache_ttl_ms() -> u64 {
    60_000
}

fn default_cache_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Per-key TTL overrides.
    #[serde(default)]
    pub ttl_ms: BTreeMap<String, u64>,
    /// Keys the background refresher keeps warm.
    #[serde(default)]
    pub tracked_keys: Vec<String>,
    #[serde(default = "default_cache_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_cache_ttl_ms(),
            ttl_ms: BTreeMap::new(),
            tracked_keys: Vec::new(),
            data_dir: default_cache_data_dir(),
        }
    }
}

impl CacheConfig {
    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl_ms.iter().fold(
            TtlPolicy::new(Duration::from_millis(self.default_ttl_ms)),
            |policy, (key, ttl_ms)| policy.with_override(key.clone(), Duration::from_millis(*ttl_ms)),
        )
    }
}

fn default_resonance_threshold() -> f64 {
    DEFAULT_RESONANCE_THRESHOLD
}

fn default_filter_rules() -> Vec<FilterRule> {
    vec![
        FilterRule::new("ambient", 0.8, 0.7, ["ambient", "thermal"]),
        FilterRule::new("movement", 0.9, 0.8, ["movement"]),
        FilterRule::new("signal", 0.6, 0.6, ["signal", "novelty"]),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_resonance_threshold")]
    pub threshold: f64,
    #[serde(default = "default_filter_rules")]
    pub rules: Vec<FilterRule>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            threshold: default_resonance_threshold(),
            rules: default_filter_rules(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_history_capacity() -> usize {
    200
}

fn default_processor_batch() -> usize {
    32
}

fn default_source_kind() -> String {
    "ambient".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_processor_batch")]
    pub processor_batch: usize,
    #[serde(default = "default_source_kind")]
    pub source_kind: String,
    /// Every n-th receive yields nothing; 0 disables idle cycles.
    #[serde(default)]
    pub idle_every: u64,
    #[serde(default = "default_simulated_fields")]
    pub fields: Vec<SimulatedField>,
    #[serde(default)]
    pub acceptance: AcceptancePolicy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_capacity: default_history_capacity(),
            processor_batch: default_processor_batch(),
            source_kind: default_source_kind(),
            idle_every: 0,
            fields: default_simulated_fields(),
            acceptance: AcceptancePolicy::default(),
        }
    }
}

fn default_backoff_multiplier() -> f64 {
    DEFAULT_BACKOFF_MULTIPLIER
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemConfig {
    #[serde(default = "default_enabled_true")]
    pub enabled: bool,
    pub frequency_hz: f64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub overrun_warn_ms: Option<f64>,
    #[serde(default)]
    pub work_timeout_ms: Option<u64>,
    #[serde(default)]
    pub missed_tick: MissedTick,
}

impl SubsystemConfig {
    fn at(frequency_hz: f64) -> Self {
        Self {
            enabled: true,
            frequency_hz,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            overrun_warn_ms: None,
            work_timeout_ms: None,
            missed_tick: MissedTick::default(),
        }
    }

    pub fn loop_spec(&self, name: &str) -> Result<LoopSpec, PipelineError> {
        let mut spec = LoopSpec::new(name, self.frequency_hz)?
            .with_backoff_multiplier(self.backoff_multiplier)
            .with_missed_tick(self.missed_tick);
        if let Some(warn_ms) = self.overrun_warn_ms {
            let threshold = Duration::try_from_secs_f64(warn_ms / 1_000.0).map_err(|_| {
                validation_error(format!(
                    "subsystem '{name}' overrun_warn_ms must be a non-negative duration, got {warn_ms}"
                ))
            })?;
            spec = spec.with_overrun_warn(threshold);
        }
        if let Some(timeout_ms) = self.work_timeout_ms {
            spec = spec.with_work_timeout(Duration::from_millis(timeout_ms));
        }
        Ok(spec)
    }
}

fn default_receiver_subsystem() -> SubsystemConfig {
    SubsystemConfig {
        backoff_multiplier: 9.0,
        overrun_warn_ms: Some(1_000.0 / 30.0),
        ..SubsystemConfig::at(90.0)
    }
}

fn default_processor_subsystem() -> SubsystemConfig {
    SubsystemConfig::at(30.0)
}

fn default_cache_refresh_subsystem() -> SubsystemConfig {
    SubsystemConfig {
        backoff_multiplier: 2.0,
        ..SubsystemConfig::at(0.2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemsConfig {
    #[serde(default = "default_receiver_subsystem")]
    pub receiver: SubsystemConfig,
    #[serde(default = "default_processor_subsystem")]
    pub processor: SubsystemConfig,
    #[serde(default = "default_cache_refresh_subsystem")]
    pub cache_refresh: SubsystemConfig,
}

impl Default for SubsystemsConfig {
    fn default() -> Self {
        Self {
            receiver: default_receiver_subsystem(),
            processor: default_processor_subsystem(),
            cache_refresh: default_cache_refresh_subsystem(),
        }
    }
}

fn default_metrics_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize config")?;

        if !config.cache.data_dir.is_absolute() {
            config.cache.data_dir = config_base.join(&config.cache.data_dir);
        }
        if let Some(report_path) = config.report_path.as_mut()
            && !report_path.is_absolute()
        {
            *report_path = config_base.join(&*report_path);
        }

        Ok(config)
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join("catalyst.schema.json");
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or catalyst.schema.json next to it"
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
