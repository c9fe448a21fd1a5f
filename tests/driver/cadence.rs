use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use catalyst::{
    driver::{
        CycleContext, CycleOutcome, LoopDriver, LoopSpec, LoopWork, MAX_LOOP_WAIT, MissedTick,
    },
    error::{PipelineError, PipelineErrorKind},
};

fn close_to(actual: Duration, expected: Duration) -> bool {
    actual.abs_diff(expected) <= Duration::from_millis(1)
}

struct BusyWork {
    cost: Duration,
}

#[async_trait]
impl LoopWork for BusyWork {
    async fn run_cycle(&mut self, _ctx: CycleContext) -> Result<(), PipelineError> {
        sleep(self.cost).await;
        Ok(())
    }
}

fn busy_work(cost: Duration) -> BusyWork {
    BusyWork { cost }
}

#[tokio::test(start_paused = true)]
async fn sleep_fills_the_rest_of_the_period() {
    let spec = LoopSpec::new("cadence", 10.0).expect("valid spec");
    let driver = LoopDriver::new(spec, busy_work(Duration::from_millis(30)));
    let metrics = driver.metrics();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(driver.run(shutdown.clone()));

    sleep(Duration::from_millis(350)).await;
    shutdown.cancel();
    let snapshot = handle.await.expect("driver task should join");

    assert!(snapshot.cycles_completed >= 3, "{snapshot:?}");
    assert_eq!(snapshot.error_count, 0);
    for record in &snapshot.recent_cycles {
        assert!(close_to(record.elapsed, Duration::from_millis(30)), "{record:?}");
        assert!(close_to(record.sleep, Duration::from_millis(70)), "{record:?}");
        assert_eq!(record.outcome, CycleOutcome::Completed);
    }
    assert!(!metrics.snapshot().running);
}

#[tokio::test(start_paused = true)]
async fn overrunning_work_never_sleeps() {
    let spec = LoopSpec::new("overrun", 10.0)
        .expect("valid spec")
        .with_overrun_warn(Duration::from_millis(120));
    let driver = LoopDriver::new(spec, busy_work(Duration::from_millis(150)));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(driver.run(shutdown.clone()));

    sleep(Duration::from_millis(500)).await;
    shutdown.cancel();
    let snapshot = handle.await.expect("driver task should join");

    assert!(snapshot.cycles_completed >= 3, "{snapshot:?}");
    assert_eq!(snapshot.overrun_count, snapshot.cycles_completed);
    assert!(
        snapshot
            .recent_cycles
            .iter()
            .all(|record| record.sleep == Duration::ZERO)
    );
}

#[tokio::test(start_paused = true)]
async fn skip_mode_realigns_to_the_period_grid() {
    let spec = LoopSpec::new("skip", 10.0)
        .expect("valid spec")
        .with_missed_tick(MissedTick::Skip);
    let driver = LoopDriver::new(spec, busy_work(Duration::from_millis(150)));
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(driver.run(shutdown.clone()));

    sleep(Duration::from_millis(250)).await;
    shutdown.cancel();
    let snapshot = handle.await.expect("driver task should join");

    let first = snapshot.recent_cycles.first().expect("one cycle should run");
    assert!(close_to(first.sleep, Duration::from_millis(50)), "{first:?}");
}

#[test]
fn non_positive_frequency_is_rejected() {
    for hz in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = LoopSpec::new("bad", hz).expect_err("frequency must be rejected");
        assert_eq!(err.kind, PipelineErrorKind::Validation);
    }
    assert!(LoopSpec::new("  ", 1.0).is_err());
}

#[test]
fn frequencies_too_low_to_schedule_are_rejected() {
    for hz in [1e-20, 1e-300, f64::MIN_POSITIVE, 1e-5] {
        let err = LoopSpec::new("slow", hz).expect_err("period must be schedulable");
        assert_eq!(err.kind, PipelineErrorKind::Validation, "{hz}");
    }

    let spec = LoopSpec::new("slow", 1e-4).expect("a ten-thousand second period is fine");
    assert_eq!(spec.period(), Duration::from_secs(10_000));
    assert!(spec.with_backoff_multiplier(10.0).backoff() <= MAX_LOOP_WAIT);
}

#[test]
fn backoff_multiplier_is_clamped() {
    let spec = LoopSpec::new("clamp", 10.0).expect("valid spec");

    assert_eq!(spec.clone().with_backoff_multiplier(1.0).backoff_multiplier, 2.0);
    assert_eq!(spec.clone().with_backoff_multiplier(50.0).backoff_multiplier, 10.0);
    assert!(close_to(
        spec.with_backoff_multiplier(5.0).backoff(),
        Duration::from_millis(500)
    ));
}
