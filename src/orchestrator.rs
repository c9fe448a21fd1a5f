use std::collections::BTreeMap;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    driver::{LoopDriver, LoopMetricsSnapshot, LoopSpec, LoopWork, SharedLoopMetrics},
    error::{PipelineError, validation_error},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub subsystems: BTreeMap<String, LoopMetricsSnapshot>,
}

struct Subsystem {
    metrics: SharedLoopMetrics,
    pending: Option<LoopDriver<Box<dyn LoopWork>>>,
    task: Option<JoinHandle<LoopMetricsSnapshot>>,
}

/// Owns one [`LoopDriver`] per named subsystem.
///
/// `status` reads each subsystem's metrics independently, so a snapshot taken
/// while loops are running may mix cycles from different instants.
pub struct Orchestrator {
    subsystems: BTreeMap<String, Subsystem>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    pub fn with_token(shutdown: CancellationToken) -> Self {
        Self {
            subsystems: BTreeMap::new(),
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn register<W>(&mut self, spec: LoopSpec, work: W) -> Result<SharedLoopMetrics, PipelineError>
    where
        W: LoopWork + 'static,
    {
        if self.subsystems.contains_key(&spec.name) {
            return Err(validation_error(format!(
                "subsystem '{}' is already registered",
                spec.name
            )));
        }

        let name = spec.name.clone();
        let driver = LoopDriver::new(spec, Box::new(work) as Box<dyn LoopWork>);
        let metrics = driver.metrics();
        self.subsystems.insert(
            name,
            Subsystem {
                metrics: metrics.clone(),
                pending: Some(driver),
                task: None,
            },
        );
        Ok(metrics)
    }

    pub fn subsystem_names(&self) -> Vec<String> {
        self.subsystems.keys().cloned().collect()
    }

    /// Spawns every registered subsystem that is not running yet. Returns how many
    /// were started. Each task runs inside a `subsystem` span parented to the
    /// caller's current span.
    pub fn start(&mut self) -> usize {
        let mut started = 0;
        for (name, subsystem) in &mut self.subsystems {
            let Some(driver) = subsystem.pending.take() else {
                continue;
            };
            let token = self.shutdown.child_token();
            let span = tracing::info_span!(target: "orchestrator", "subsystem", subsystem = %name);
            subsystem.task = Some(tokio::spawn(driver.run(token).instrument(span)));
            started += 1;
            tracing::info!(target: "orchestrator", subsystem = %name, "subsystem_started");
        }
        started
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
            && self
                .subsystems
                .values()
                .any(|subsystem| subsystem.task.as_ref().is_some_and(|task| !task.is_finished()))
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            running: self.is_running(),
            subsystems: self
                .subsystems
                .iter()
                .map(|(name, subsystem)| (name.clone(), subsystem.metrics.snapshot()))
                .collect(),
        }
    }

    /// Cancels every loop and waits for all of them to exit.
    pub async fn shutdown(&mut self) -> OrchestratorStatus {
        self.shutdown.cancel();

        let mut names = Vec::new();
        let mut tasks = Vec::new();
        for (name, subsystem) in &mut self.subsystems {
            subsystem.pending = None;
            if let Some(task) = subsystem.task.take() {
                names.push(name.clone());
                tasks.push(task);
            }
        }

        let mut final_snapshots = BTreeMap::new();
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(snapshot) => {
                    final_snapshots.insert(name, snapshot);
                }
                Err(err) => {
                    tracing::error!(
                        target: "orchestrator",
                        subsystem = %name,
                        error = %err,
                        "subsystem_task_join_failed"
                    );
                }
            }
        }

        let mut status = self.status();
        for (name, snapshot) in final_snapshots {
            status.subsystems.insert(name, snapshot);
        }
        status.running = false;
        tracing::info!(
            target: "orchestrator",
            subsystems = status.subsystems.len(),
            "orchestrator_stopped"
        );
        status
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
