use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use catalyst::{
    driver::{CycleContext, CycleOutcome, FnWork, LoopDriver, LoopSpec},
    error::{PipelineError, PipelineErrorKind, work_error},
};

#[tokio::test(start_paused = true)]
async fn failed_cycle_backs_off_and_loop_keeps_running() {
    let spec = LoopSpec::new("flaky", 10.0).expect("valid spec");
    let work = FnWork::new(|ctx: CycleContext| async move {
        if ctx.cycle == 3 {
            Err(work_error("sensor bus reset"))
        } else {
            Ok(())
        }
    });
    let driver = LoopDriver::new(spec, work);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(driver.run(shutdown.clone()));

    sleep(Duration::from_millis(750)).await;
    shutdown.cancel();
    let snapshot = handle.await.expect("driver task should join");

    assert_eq!(snapshot.error_count, 1);
    assert!(snapshot.cycles_completed >= 4, "{snapshot:?}");
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("sensor bus reset")
    );

    let cycles = &snapshot.recent_cycles;
    assert_eq!(cycles[2].outcome, CycleOutcome::Failed(PipelineErrorKind::Work));
    assert!(cycles[2].sleep > cycles[0].sleep);
    assert!(cycles[2].sleep > cycles[1].sleep);
    assert_eq!(cycles[3].outcome, CycleOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn work_exceeding_its_timeout_fails_with_timeout_kind() {
    let spec = LoopSpec::new("slow", 10.0)
        .expect("valid spec")
        .with_work_timeout(Duration::from_millis(50));
    let work = FnWork::new(|_ctx: CycleContext| async {
        sleep(Duration::from_millis(200)).await;
        Ok::<(), PipelineError>(())
    });
    let driver = LoopDriver::new(spec, work);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(driver.run(shutdown.clone()));

    sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    let snapshot = handle.await.expect("driver task should join");

    assert_eq!(snapshot.error_count, 1);
    assert_eq!(snapshot.timeout_count, 1);
    assert_eq!(
        snapshot.recent_cycles[0].outcome,
        CycleOutcome::Failed(PipelineErrorKind::Timeout)
    );
    assert!(
        snapshot
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("exceeded 50ms"))
    );
}
