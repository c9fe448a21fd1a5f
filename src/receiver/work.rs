use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    driver::{CycleContext, LoopWork},
    error::PipelineError,
    filter::{FilterChain, FilterStats},
    receiver::{
        acceptance::AcceptancePolicy,
        queue::{CatalystHistory, CatalystQueue},
        source::{CatalystSource, validate_item},
    },
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiverStats {
    pub received: u64,
    pub idle_cycles: u64,
    pub rejected: u64,
    #[serde(default)]
    pub declined: u64,
    pub filtered_out: u64,
    pub queued: u64,
    pub filter: FilterStats,
}

#[derive(Debug, Clone, Default)]
pub struct SharedReceiverStats {
    inner: Arc<Mutex<ReceiverStats>>,
}

impl SharedReceiverStats {
    fn lock(&self) -> MutexGuard<'_, ReceiverStats> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ReceiverStats {
        self.lock().clone()
    }
}

/// Pulls one catalyst per cycle, validates it, checks it against the acceptance
/// policy, filters it and queues whatever survives the filter.
pub struct ReceiverWork {
    source: Arc<dyn CatalystSource>,
    acceptance: AcceptancePolicy,
    chain: FilterChain,
    queue: Arc<CatalystQueue>,
    stats: SharedReceiverStats,
}

impl ReceiverWork {
    pub fn new(source: Arc<dyn CatalystSource>, chain: FilterChain, queue: Arc<CatalystQueue>) -> Self {
        Self {
            source,
            acceptance: AcceptancePolicy::default(),
            chain,
            queue,
            stats: SharedReceiverStats::default(),
        }
    }

    pub fn with_acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn stats(&self) -> SharedReceiverStats {
        self.stats.clone()
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }
}

#[async_trait]
impl LoopWork for ReceiverWork {
    async fn run_cycle(&mut self, ctx: CycleContext) -> Result<(), PipelineError> {
        let Some(item) = self.source.receive().await? else {
            self.stats.lock().idle_cycles += 1;
            return Ok(());
        };

        if let Err(err) = validate_item(&item) {
            tracing::debug!(
                target: "receiver",
                cycle = ctx.cycle,
                item_id = %item.id,
                error = %err,
                "catalyst_rejected"
            );
            let mut stats = self.stats.lock();
            stats.received += 1;
            stats.rejected += 1;
            return Ok(());
        }

        if let Some(field) = self.acceptance.declined_by(&item) {
            tracing::debug!(
                target: "receiver",
                cycle = ctx.cycle,
                item_id = %item.id,
                field = field,
                "catalyst_declined"
            );
            let mut stats = self.stats.lock();
            stats.received += 1;
            stats.declined += 1;
            return Ok(());
        }

        let filtered = self.chain.apply(&item);
        let mut stats = self.stats.lock();
        stats.received += 1;
        stats.filter = self.chain.stats().clone();

        if filtered.is_empty() {
            stats.filtered_out += 1;
            tracing::debug!(
                target: "receiver",
                cycle = ctx.cycle,
                item_id = %item.id,
                "catalyst_filtered_out"
            );
            return Ok(());
        }

        stats.queued += 1;
        drop(stats);
        let item_id = filtered.item_id.clone();
        if self.queue.push(filtered) {
            tracing::warn!(
                target: "receiver",
                cycle = ctx.cycle,
                item_id = %item_id,
                capacity = self.queue.capacity(),
                "catalyst_queue_overflow_dropped_oldest"
            );
        }
        Ok(())
    }
}

/// Moves queued catalysts into the bounded history.
pub struct ProcessorWork {
    queue: Arc<CatalystQueue>,
    history: Arc<CatalystHistory>,
    batch_limit: usize,
}

impl ProcessorWork {
    pub fn new(queue: Arc<CatalystQueue>, history: Arc<CatalystHistory>, batch_limit: usize) -> Self {
        Self {
            queue,
            history,
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn drain_remaining(&self) -> usize {
        self.queue.drain_into(&self.history)
    }
}

#[async_trait]
impl LoopWork for ProcessorWork {
    async fn run_cycle(&mut self, ctx: CycleContext) -> Result<(), PipelineError> {
        for catalyst in self.queue.drain(self.batch_limit) {
            tracing::debug!(
                target: "processor",
                cycle = ctx.cycle,
                item_id = %catalyst.item_id,
                kind = %catalyst.kind,
                retained = catalyst.filtered_content.len(),
                aggregate_intensity = catalyst.aggregate_intensity,
                "catalyst_processed"
            );
            self.history.record(catalyst);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) {
        let drained = self.drain_remaining();
        if drained > 0 {
            tracing::info!(
                target: "processor",
                drained = drained,
                "catalyst_queue_drained_on_shutdown"
            );
        }
    }
}
