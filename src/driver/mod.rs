pub mod metrics;
pub mod runner;
pub mod spec;
pub mod work;

pub use metrics::{
    CycleOutcome, CycleRecord, LoopMetrics, LoopMetricsSnapshot, RECENT_CYCLE_WINDOW,
    SharedLoopMetrics,
};
pub use runner::LoopDriver;
pub use spec::{DEFAULT_BACKOFF_MULTIPLIER, LoopSpec, MAX_LOOP_WAIT, MissedTick};
pub use work::{CycleContext, FnWork, LoopWork};
