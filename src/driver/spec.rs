use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, validation_error};

pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 5.0;
const MIN_BACKOFF_MULTIPLIER: f64 = 2.0;
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;
/// Longest wait a loop may schedule, backoff included.
pub const MAX_LOOP_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What the driver does with its deadline after a cycle overruns the period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedTick {
    /// Start the next cycle immediately and measure the period from there.
    #[default]
    Delay,
    /// Wait for the next slot on the original period grid.
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSpec {
    pub name: String,
    pub frequency_hz: f64,
    pub backoff_multiplier: f64,
    pub overrun_warn: Option<Duration>,
    pub work_timeout: Option<Duration>,
    pub missed_tick: MissedTick,
}

impl LoopSpec {
    pub fn new(name: impl Into<String>, frequency_hz: f64) -> Result<Self, PipelineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(validation_error("loop name cannot be empty"));
        }
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return Err(validation_error(format!(
                "loop '{name}' frequency must be a positive number of Hz, got {frequency_hz}"
            )));
        }
        match Duration::try_from_secs_f64(MAX_BACKOFF_MULTIPLIER / frequency_hz) {
            Ok(longest) if longest <= MAX_LOOP_WAIT => {}
            _ => {
                return Err(validation_error(format!(
                    "loop '{name}' frequency {frequency_hz} Hz is too low: backoff would exceed {}s",
                    MAX_LOOP_WAIT.as_secs()
                )));
            }
        }

        Ok(Self {
            name,
            frequency_hz,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            overrun_warn: None,
            work_timeout: None,
            missed_tick: MissedTick::default(),
        })
    }

    /// Clamped to 2..=10 times the nominal period.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_finite() {
            multiplier.clamp(MIN_BACKOFF_MULTIPLIER, MAX_BACKOFF_MULTIPLIER)
        } else {
            DEFAULT_BACKOFF_MULTIPLIER
        };
        self
    }

    pub fn with_overrun_warn(mut self, threshold: Duration) -> Self {
        self.overrun_warn = Some(threshold);
        self
    }

    pub fn with_work_timeout(mut self, timeout: Duration) -> Self {
        self.work_timeout = Some(timeout);
        self
    }

    pub fn with_missed_tick(mut self, missed_tick: MissedTick) -> Self {
        self.missed_tick = missed_tick;
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    pub fn backoff(&self) -> Duration {
        self.period().mul_f64(self.backoff_multiplier)
    }
}
