use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::Instrument;

use catalyst::{
    cli::config_path_from_args,
    config::Config,
    logging::init_tracing,
    observability::metrics::start_prometheus_exporter,
    runtime::{PipelineRuntime, write_status_report},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let logging_guard = init_tracing(&config.logging)?;

    if config.metrics.enabled {
        let metrics = start_prometheus_exporter(config.metrics.listen_addr)
            .context("failed to start prometheus exporter")?;
        tracing::info!(
            target: "observability",
            listen_addr = %metrics.listen_addr,
            "metrics_exporter_started"
        );
    }

    let mut runtime = PipelineRuntime::init(&config).context("failed to build pipeline runtime")?;

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;

    let run_span = logging_guard.run_span().clone();
    let started = run_span.in_scope(|| runtime.start());
    tracing::info!(
        target: "runtime",
        parent: &run_span,
        run_id = logging_guard.run_id(),
        started,
        config = %config_path.display(),
        "catalyst_started"
    );

    let signal_name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    tracing::info!(target: "runtime", signal = signal_name, "shutdown_requested");

    let status = runtime.shutdown().instrument(run_span).await;
    if let Some(report_path) = &config.report_path {
        write_status_report(report_path, &status)?;
        tracing::info!(target: "runtime", path = %report_path.display(), "status_report_written");
    }

    eprintln!("catalyst stopped: received {signal_name}");
    Ok(())
}
