use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    driver::{
        metrics::{CycleOutcome, CycleRecord, LoopMetrics, LoopMetricsSnapshot, SharedLoopMetrics},
        spec::{LoopSpec, MissedTick},
        work::{CycleContext, LoopWork},
    },
    error::{PipelineError, timeout_error},
    observability::metrics::{record_loop_cycle, record_loop_error, record_loop_overrun},
};

/// Runs a [`LoopWork`] at a fixed rate until cancelled.
///
/// The driver keeps a virtual deadline that advances by one period per cycle and
/// sleeps until it, so short cycles do not accumulate drift. An overrun re-anchors
/// the deadline instead of bursting to catch up. A failed cycle is followed by a
/// backoff of `period * backoff_multiplier`.
pub struct LoopDriver<W> {
    spec: LoopSpec,
    work: W,
    metrics: SharedLoopMetrics,
}

impl<W: LoopWork> LoopDriver<W> {
    pub fn new(spec: LoopSpec, work: W) -> Self {
        let metrics = SharedLoopMetrics::new(LoopMetrics::new(spec.name.clone(), spec.frequency_hz));
        Self {
            spec,
            work,
            metrics,
        }
    }

    pub fn spec(&self) -> &LoopSpec {
        &self.spec
    }

    pub fn metrics(&self) -> SharedLoopMetrics {
        self.metrics.clone()
    }

    #[tracing::instrument(
        name = "loop_driver_run",
        target = "driver",
        skip(self, shutdown),
        fields(loop_name = %self.spec.name, frequency_hz = self.spec.frequency_hz)
    )]
    pub async fn run(mut self, shutdown: CancellationToken) -> LoopMetricsSnapshot {
        let period = self.spec.period();
        let mut deadline = Instant::now();
        let mut cycle = 0u64;
        self.metrics.lock().running = true;
        tracing::info!(
            target: "driver",
            loop_name = %self.spec.name,
            period_ms = period.as_secs_f64() * 1_000.0,
            "loop_started"
        );

        while !shutdown.is_cancelled() {
            cycle = cycle.saturating_add(1);
            let cycle_start = Instant::now();
            let outcome = self.run_work(CycleContext { cycle, period }).await;
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(cycle_start);

            let sleep = match &outcome {
                Ok(()) => {
                    deadline = next_deadline(deadline, period, now, self.spec.missed_tick);
                    deadline.saturating_duration_since(now)
                }
                Err(_) => {
                    let backoff = self.spec.backoff();
                    deadline = now + backoff;
                    backoff
                }
            };

            self.record(cycle, elapsed, sleep, &outcome);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep_until(deadline) => {}
            }
        }

        self.work.on_shutdown().await;
        let snapshot = {
            let mut metrics = self.metrics.lock();
            metrics.running = false;
            metrics.snapshot()
        };
        tracing::info!(
            target: "driver",
            loop_name = %self.spec.name,
            cycles_completed = snapshot.cycles_completed,
            error_count = snapshot.error_count,
            "loop_stopped"
        );
        snapshot
    }

    async fn run_work(&mut self, ctx: CycleContext) -> Result<(), PipelineError> {
        match self.spec.work_timeout {
            Some(limit) => match timeout(limit, self.work.run_cycle(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(timeout_error(format!(
                    "cycle {} of loop '{}' exceeded {}ms",
                    ctx.cycle,
                    self.spec.name,
                    limit.as_millis()
                ))),
            },
            None => self.work.run_cycle(ctx).await,
        }
    }

    fn record(
        &self,
        cycle: u64,
        elapsed: Duration,
        sleep: Duration,
        outcome: &Result<(), PipelineError>,
    ) {
        let mut metrics = self.metrics.lock();

        if let Some(limit) = self.spec.overrun_warn
            && elapsed > limit
        {
            metrics.record_overrun();
            record_loop_overrun(&self.spec.name);
            tracing::warn!(
                target: "driver",
                loop_name = %self.spec.name,
                cycle = cycle,
                elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
                limit_ms = limit.as_secs_f64() * 1_000.0,
                "loop_cycle_overrun"
            );
        }

        let outcome = match outcome {
            Ok(()) => CycleOutcome::Completed,
            Err(err) => {
                metrics.record_error(err);
                record_loop_error(&self.spec.name, err.kind);
                tracing::error!(
                    target: "driver",
                    loop_name = %self.spec.name,
                    cycle = cycle,
                    kind = err.kind.as_str(),
                    error = %err,
                    backoff_ms = sleep.as_secs_f64() * 1_000.0,
                    "loop_cycle_failed"
                );
                CycleOutcome::Failed(err.kind)
            }
        };

        metrics.record_cycle(CycleRecord {
            cycle,
            elapsed,
            sleep,
            outcome,
        });
        record_loop_cycle(&self.spec.name, elapsed);
    }
}

fn next_deadline(previous: Instant, period: Duration, now: Instant, missed: MissedTick) -> Instant {
    let scheduled = previous + period;
    if scheduled >= now {
        return scheduled;
    }

    match missed {
        MissedTick::Delay => now,
        MissedTick::Skip => {
            let behind = now.saturating_duration_since(scheduled).as_secs_f64();
            let slots = (behind / period.as_secs_f64()).ceil().max(1.0);
            scheduled + period.mul_f64(slots)
        }
    }
}
