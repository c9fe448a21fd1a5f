use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{PipelineError, PipelineErrorKind},
    types::CycleId,
};

pub const RECENT_CYCLE_WINDOW: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    Failed(PipelineErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: CycleId,
    pub elapsed: Duration,
    pub sleep: Duration,
    pub outcome: CycleOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopMetrics {
    pub name: String,
    pub frequency_hz: f64,
    pub cycles_completed: u64,
    pub error_count: u64,
    pub overrun_count: u64,
    pub timeout_count: u64,
    pub avg_cycle_time: Duration,
    pub last_sleep: Duration,
    pub last_error: Option<PipelineError>,
    pub running: bool,
    busy_and_idle: Duration,
    recent: VecDeque<CycleRecord>,
}

impl LoopMetrics {
    pub fn new(name: impl Into<String>, frequency_hz: f64) -> Self {
        Self {
            name: name.into(),
            frequency_hz,
            cycles_completed: 0,
            error_count: 0,
            overrun_count: 0,
            timeout_count: 0,
            avg_cycle_time: Duration::ZERO,
            last_sleep: Duration::ZERO,
            last_error: None,
            running: false,
            busy_and_idle: Duration::ZERO,
            recent: VecDeque::with_capacity(RECENT_CYCLE_WINDOW),
        }
    }

    pub fn record_cycle(&mut self, record: CycleRecord) {
        self.cycles_completed = self.cycles_completed.saturating_add(1);
        let count = self.cycles_completed as f64;
        let avg = (self.avg_cycle_time.as_secs_f64() * (count - 1.0)
            + record.elapsed.as_secs_f64())
            / count;
        self.avg_cycle_time = Duration::from_secs_f64(avg);
        self.last_sleep = record.sleep;
        self.busy_and_idle = self
            .busy_and_idle
            .saturating_add(record.elapsed)
            .saturating_add(record.sleep);

        self.recent.push_back(record);
        while self.recent.len() > RECENT_CYCLE_WINDOW {
            self.recent.pop_front();
        }
    }

    pub fn record_error(&mut self, err: &PipelineError) {
        self.error_count = self.error_count.saturating_add(1);
        if err.kind == PipelineErrorKind::Timeout {
            self.timeout_count = self.timeout_count.saturating_add(1);
        }
        self.last_error = Some(err.clone());
    }

    pub fn record_overrun(&mut self) {
        self.overrun_count = self.overrun_count.saturating_add(1);
    }

    pub fn recent_cycles(&self) -> impl Iterator<Item = &CycleRecord> {
        self.recent.iter()
    }

    /// Cycles per second actually achieved, counting both work and sleep time.
    pub fn achieved_hz(&self) -> f64 {
        let total = self.busy_and_idle.as_secs_f64();
        if total <= 0.0 {
            return 0.0;
        }
        self.cycles_completed as f64 / total
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            name: self.name.clone(),
            frequency_hz: self.frequency_hz,
            achieved_hz: self.achieved_hz(),
            cycles_completed: self.cycles_completed,
            error_count: self.error_count,
            overrun_count: self.overrun_count,
            timeout_count: self.timeout_count,
            avg_cycle_time_ms: self.avg_cycle_time.as_secs_f64() * 1_000.0,
            last_sleep_ms: self.last_sleep.as_secs_f64() * 1_000.0,
            last_error: self.last_error.as_ref().map(ToString::to_string),
            running: self.running,
            recent_cycles: self.recent.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopMetricsSnapshot {
    pub name: String,
    pub frequency_hz: f64,
    pub achieved_hz: f64,
    pub cycles_completed: u64,
    pub error_count: u64,
    pub overrun_count: u64,
    pub timeout_count: u64,
    pub avg_cycle_time_ms: f64,
    pub last_sleep_ms: f64,
    pub last_error: Option<String>,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_cycles: Vec<CycleRecord>,
}

#[derive(Debug, Clone)]
pub struct SharedLoopMetrics {
    inner: Arc<Mutex<LoopMetrics>>,
}

impl SharedLoopMetrics {
    pub fn new(metrics: LoopMetrics) -> Self {
        Self {
            inner: Arc::new(Mutex::new(metrics)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, LoopMetrics> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        self.lock().snapshot()
    }
}
