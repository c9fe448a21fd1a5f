use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use catalyst::{
    driver::{CycleContext, LoopDriver, LoopSpec, LoopWork},
    error::PipelineError,
};

#[derive(Clone, Default)]
struct Probe {
    cycles: Arc<AtomicU64>,
    shut_down: Arc<AtomicBool>,
}

#[async_trait]
impl LoopWork for Probe {
    async fn run_cycle(&mut self, _ctx: CycleContext) -> Result<(), PipelineError> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_shutdown(&mut self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_long_sleep() {
    let probe = Probe::default();
    let spec = LoopSpec::new("slow_poll", 0.01).expect("valid spec");
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(LoopDriver::new(spec, probe.clone()).run(shutdown.clone()));

    sleep(Duration::from_millis(10)).await;
    shutdown.cancel();
    let snapshot = timeout(Duration::from_secs(1), handle)
        .await
        .expect("driver should stop well before its 100s period")
        .expect("driver task should join");

    assert_eq!(snapshot.cycles_completed, 1);
    assert_eq!(probe.cycles.load(Ordering::SeqCst), 1);
    assert!(probe.shut_down.load(Ordering::SeqCst));
    assert!(!snapshot.running);
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_runs_no_cycles() {
    let probe = Probe::default();
    let spec = LoopSpec::new("never", 10.0).expect("valid spec");
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let snapshot = LoopDriver::new(spec, probe.clone()).run(shutdown).await;

    assert_eq!(snapshot.cycles_completed, 0);
    assert_eq!(probe.cycles.load(Ordering::SeqCst), 0);
    assert!(probe.shut_down.load(Ordering::SeqCst));
}
