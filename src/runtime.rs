use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::broadcast;

use crate::{
    cache::TtlCache,
    clock::{Clock, shared_system_clock},
    config::{CACHE_REFRESH_SUBSYSTEM, Config, PROCESSOR_SUBSYSTEM, RECEIVER_SUBSYSTEM},
    error::PipelineError,
    filter::FilterChain,
    orchestrator::{Orchestrator, OrchestratorStatus},
    receiver::{
        CatalystHistory, CatalystQueue, CatalystSource, ProcessorWork, ReceiverStats,
        ReceiverWork, SharedReceiverStats, SimulatedSource,
    },
    refresher::{CacheRefreshWork, CacheUpdate, DataSource, JsonDirSource},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub generated_at: String,
    pub orchestrator: OrchestratorStatus,
    pub receiver: Option<ReceiverStats>,
    pub queue_depth: usize,
    pub queue_dropped: u64,
    pub history_len: usize,
    pub processed_total: u64,
    pub cache_keys: Vec<String>,
    pub expired_cache_keys: Vec<String>,
}

/// Every piece of process state, built explicitly from a [`Config`].
pub struct PipelineRuntime {
    cache: Arc<TtlCache>,
    queue: Arc<CatalystQueue>,
    history: Arc<CatalystHistory>,
    receiver_stats: Option<SharedReceiverStats>,
    drain_on_shutdown: bool,
    cache_updates: Option<broadcast::Sender<CacheUpdate>>,
    orchestrator: Orchestrator,
}

impl PipelineRuntime {
    pub fn init(config: &Config) -> Result<Self, PipelineError> {
        let source = Arc::new(SimulatedSource::new(
            config.receiver.source_kind.clone(),
            config.receiver.fields.clone(),
            config.receiver.idle_every,
        ));
        let data_source = Arc::new(JsonDirSource::new(config.cache.data_dir.clone()));
        Self::with_collaborators(config, source, data_source, shared_system_clock())
    }

    pub fn with_collaborators(
        config: &Config,
        catalyst_source: Arc<dyn CatalystSource>,
        data_source: Arc<dyn DataSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PipelineError> {
        let cache = Arc::new(TtlCache::new(config.cache.ttl_policy(), clock));
        let queue = Arc::new(CatalystQueue::new(config.receiver.queue_capacity));
        let history = Arc::new(CatalystHistory::new(config.receiver.history_capacity));
        let mut orchestrator = Orchestrator::new();
        let mut receiver_stats = None;
        let mut cache_updates = None;

        let subsystems = &config.subsystems;
        if subsystems.receiver.enabled {
            let chain = FilterChain::with_rules(config.filter.threshold, config.filter.rules.clone());
            let work = ReceiverWork::new(catalyst_source, chain, Arc::clone(&queue))
                .with_acceptance(config.receiver.acceptance.clone());
            receiver_stats = Some(work.stats());
            orchestrator.register(subsystems.receiver.loop_spec(RECEIVER_SUBSYSTEM)?, work)?;
        }

        if subsystems.processor.enabled {
            let work = ProcessorWork::new(
                Arc::clone(&queue),
                Arc::clone(&history),
                config.receiver.processor_batch,
            );
            orchestrator.register(subsystems.processor.loop_spec(PROCESSOR_SUBSYSTEM)?, work)?;
        }

        if subsystems.cache_refresh.enabled && !config.cache.tracked_keys.is_empty() {
            let work = CacheRefreshWork::new(
                Arc::clone(&cache),
                data_source,
                config.cache.tracked_keys.clone(),
            );
            cache_updates = Some(work.update_sender());
            orchestrator.register(
                subsystems.cache_refresh.loop_spec(CACHE_REFRESH_SUBSYSTEM)?,
                work,
            )?;
        }

        tracing::info!(
            target: "runtime",
            subsystems = ?orchestrator.subsystem_names(),
            "pipeline_runtime_initialized"
        );

        Ok(Self {
            cache,
            queue,
            history,
            receiver_stats,
            drain_on_shutdown: subsystems.processor.enabled,
            cache_updates,
            orchestrator,
        })
    }

    pub fn cache(&self) -> Arc<TtlCache> {
        Arc::clone(&self.cache)
    }

    pub fn queue(&self) -> Arc<CatalystQueue> {
        Arc::clone(&self.queue)
    }

    pub fn history(&self) -> Arc<CatalystHistory> {
        Arc::clone(&self.history)
    }

    /// `None` when no cache refresher is registered.
    pub fn subscribe_cache_updates(&self) -> Option<broadcast::Receiver<CacheUpdate>> {
        self.cache_updates.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn start(&mut self) -> usize {
        self.orchestrator.start()
    }

    pub fn status(&self) -> RuntimeStatus {
        self.compose_status(self.orchestrator.status())
    }

    /// Stops every subsystem, then hands catalysts queued by cycles that were
    /// still in flight when the processor stopped over to the history.
    pub async fn shutdown(&mut self) -> RuntimeStatus {
        let orchestrator_status = self.orchestrator.shutdown().await;
        if self.drain_on_shutdown {
            let drained = self.queue.drain_into(&self.history);
            if drained > 0 {
                tracing::info!(
                    target: "runtime",
                    drained = drained,
                    "late_catalysts_drained_after_shutdown"
                );
            }
        }
        self.compose_status(orchestrator_status)
    }

    fn compose_status(&self, orchestrator: OrchestratorStatus) -> RuntimeStatus {
        RuntimeStatus {
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            orchestrator,
            receiver: self.receiver_stats.as_ref().map(SharedReceiverStats::snapshot),
            queue_depth: self.queue.len(),
            queue_dropped: self.queue.dropped(),
            history_len: self.history.len(),
            processed_total: self.history.total_processed(),
            cache_keys: self.cache.keys(),
            expired_cache_keys: self.cache.expired_keys(),
        }
    }
}

/// Writes `status` as pretty JSON, creating parent directories as needed.
pub fn write_status_report(path: &Path, status: &RuntimeStatus) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report directory {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(status).context("failed to serialize status report")?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}
