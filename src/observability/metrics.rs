use std::{net::SocketAddr, time::Duration};

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::error::PipelineErrorKind;

pub const LOOP_CYCLES_METRIC: &str = "catalyst_loop_cycles_total";
pub const LOOP_ERRORS_METRIC: &str = "catalyst_loop_errors_total";
pub const LOOP_OVERRUNS_METRIC: &str = "catalyst_loop_overruns_total";
pub const LOOP_CYCLE_SECONDS_METRIC: &str = "catalyst_loop_cycle_seconds";
pub const CACHE_FETCH_FAILURES_METRIC: &str = "catalyst_cache_fetch_failures_total";
pub const CACHE_UPDATES_METRIC: &str = "catalyst_cache_updates_published_total";
pub const CACHE_UPDATE_RECEIVERS_METRIC: &str = "catalyst_cache_update_receivers";
pub const QUEUE_DEPTH_METRIC: &str = "catalyst_queue_depth";
pub const QUEUE_DROPPED_METRIC: &str = "catalyst_queue_dropped_total";

#[derive(Debug, Clone, Copy)]
pub struct MetricsRuntime {
    pub listen_addr: SocketAddr,
}

pub fn start_prometheus_exporter(listen_addr: SocketAddr) -> Result<MetricsRuntime, BuildError> {
    describe_counter!(LOOP_CYCLES_METRIC, Unit::Count, "Cycles run by each loop driver.");
    describe_counter!(LOOP_ERRORS_METRIC, Unit::Count, "Failed loop cycles, by error kind.");
    describe_counter!(
        LOOP_OVERRUNS_METRIC,
        Unit::Count,
        "Cycles whose work exceeded the loop's overrun threshold."
    );
    describe_histogram!(
        LOOP_CYCLE_SECONDS_METRIC,
        Unit::Seconds,
        "Time spent inside loop work per cycle."
    );
    describe_counter!(
        CACHE_FETCH_FAILURES_METRIC,
        Unit::Count,
        "Cache fetches that failed and fell back to stale or empty values."
    );
    describe_counter!(
        CACHE_UPDATES_METRIC,
        Unit::Count,
        "Cache refresh notifications published to subscribers."
    );
    describe_gauge!(
        CACHE_UPDATE_RECEIVERS_METRIC,
        Unit::Count,
        "Subscribers that received the latest cache refresh notification."
    );
    describe_gauge!(QUEUE_DEPTH_METRIC, Unit::Count, "Filtered catalysts awaiting processing.");
    describe_counter!(
        QUEUE_DROPPED_METRIC,
        Unit::Count,
        "Filtered catalysts dropped because the queue was full."
    );

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()?;

    Ok(MetricsRuntime { listen_addr })
}

pub fn record_loop_cycle(loop_name: &str, elapsed: Duration) {
    counter!(LOOP_CYCLES_METRIC, "loop" => loop_name.to_string()).increment(1);
    histogram!(LOOP_CYCLE_SECONDS_METRIC, "loop" => loop_name.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_loop_error(loop_name: &str, kind: PipelineErrorKind) {
    counter!(
        LOOP_ERRORS_METRIC,
        "loop" => loop_name.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

pub fn record_loop_overrun(loop_name: &str) {
    counter!(LOOP_OVERRUNS_METRIC, "loop" => loop_name.to_string()).increment(1);
}

pub fn record_cache_fetch_failure(key: &str) {
    counter!(CACHE_FETCH_FAILURES_METRIC, "key" => key.to_string()).increment(1);
}

pub fn record_cache_update_published(receivers: usize) {
    counter!(CACHE_UPDATES_METRIC).increment(1);
    gauge!(CACHE_UPDATE_RECEIVERS_METRIC).set(receivers as f64);
}

pub fn record_queue_depth(depth: usize) {
    gauge!(QUEUE_DEPTH_METRIC).set(depth as f64);
}

pub fn record_queue_dropped() {
    counter!(QUEUE_DROPPED_METRIC).increment(1);
}
