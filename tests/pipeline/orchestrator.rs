use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{
    Subscriber,
    field::{Field, Visit},
    span,
};
use tracing_subscriber::{
    Layer,
    layer::{Context, SubscriberExt},
};

use catalyst::{
    driver::{CycleContext, FnWork, LoopSpec, LoopWork},
    error::{PipelineError, PipelineErrorKind, work_error},
    orchestrator::Orchestrator,
};

struct Idle;

#[async_trait]
impl LoopWork for Idle {
    async fn run_cycle(&mut self, _ctx: CycleContext) -> Result<(), PipelineError> {
        Ok(())
    }
}

fn idle_work() -> Idle {
    Idle
}

/// Records `<span name>:<subsystem field>` for every span opened.
#[derive(Clone, Default)]
struct SpanLog(Arc<Mutex<Vec<String>>>);

struct SubsystemField(Option<String>);

impl Visit for SubsystemField {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "subsystem" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for SpanLog {
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: Context<'_, S>) {
        let mut field = SubsystemField(None);
        attrs.record(&mut field);
        self.0.lock().expect("span log lock").push(format!(
            "{}:{}",
            attrs.metadata().name(),
            field.0.unwrap_or_default()
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_subsystem_names_are_rejected() {
    let mut orchestrator = Orchestrator::new();
    orchestrator
        .register(LoopSpec::new("receiver", 10.0).expect("valid spec"), idle_work())
        .expect("first registration should succeed");

    let err = orchestrator
        .register(LoopSpec::new("receiver", 5.0).expect("valid spec"), idle_work())
        .expect_err("duplicate name should be rejected");

    assert_eq!(err.kind, PipelineErrorKind::Validation);
    assert_eq!(orchestrator.subsystem_names(), vec!["receiver".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn subsystems_run_independently_until_shutdown() {
    let mut orchestrator = Orchestrator::new();
    orchestrator
        .register(LoopSpec::new("fast", 20.0).expect("valid spec"), idle_work())
        .expect("register fast");
    orchestrator
        .register(
            LoopSpec::new("failing", 10.0).expect("valid spec"),
            FnWork::new(|_ctx: CycleContext| async { Err::<(), _>(work_error("always down")) }),
        )
        .expect("register failing");

    assert_eq!(orchestrator.start(), 2);
    assert_eq!(orchestrator.start(), 0);
    sleep(Duration::from_millis(1_000)).await;

    let running = orchestrator.status();
    assert!(running.running);
    assert!(running.subsystems["fast"].running);
    assert!(running.subsystems["fast"].cycles_completed >= 19);
    assert_eq!(running.subsystems["fast"].error_count, 0);
    assert!(running.subsystems["failing"].error_count >= 2);

    let stopped = orchestrator.shutdown().await;
    assert!(!stopped.running);
    assert!(!orchestrator.is_running());
    assert!(stopped.subsystems.values().all(|snapshot| !snapshot.running));
    assert_eq!(stopped.subsystems.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn parent_token_cancellation_stops_every_subsystem() {
    let mut orchestrator = Orchestrator::new();
    let token = orchestrator.shutdown_token();
    orchestrator
        .register(LoopSpec::new("a", 10.0).expect("valid spec"), idle_work())
        .expect("register a");
    orchestrator
        .register(LoopSpec::new("b", 10.0).expect("valid spec"), idle_work())
        .expect("register b");
    orchestrator.start();

    sleep(Duration::from_millis(150)).await;
    token.cancel();
    sleep(Duration::from_millis(10)).await;

    assert!(!orchestrator.is_running());
    let status = orchestrator.shutdown().await;
    assert!(status.subsystems.values().all(|snapshot| snapshot.cycles_completed >= 1));
}

#[tokio::test(start_paused = true)]
async fn each_subsystem_runs_inside_its_own_span() {
    let spans = SpanLog::default();
    let _default =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(spans.clone()));

    let mut orchestrator = Orchestrator::new();
    for name in ["alpha", "beta"] {
        orchestrator
            .register(LoopSpec::new(name, 10.0).expect("valid spec"), idle_work())
            .expect("register");
    }
    orchestrator.start();
    sleep(Duration::from_millis(50)).await;
    orchestrator.shutdown().await;

    let recorded = spans.0.lock().expect("span log lock").clone();
    assert!(recorded.contains(&"subsystem:alpha".to_string()), "{recorded:?}");
    assert!(recorded.contains(&"subsystem:beta".to_string()), "{recorded:?}");
}
