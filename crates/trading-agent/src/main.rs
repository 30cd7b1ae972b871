use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{AccountSource, OvertradingStore};
use analysis_orchestrator::{CycleContext, CycleServices, SignalPipeline};
use anyhow::{Context, Result};
use decision_engine::InMemoryOvertradingStore;
use tokio::signal::unix::SignalKind;
use tokio::sync::Notify;
use tokio::time;

mod config;
mod execution;
mod metrics;
mod snapshot_source;

use config::AgentConfig;
use execution::PaperExecutionSink;
use metrics::AgentMetrics;
use snapshot_source::JsonSnapshotSource;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        tracing::error!("PANIC: {info}");
    }));

    // 2. Configuration. Any error here exits the process.
    let config = AgentConfig::from_env().context("invalid agent configuration")?;
    let pipeline_config = config.pipeline_config(|key| std::env::var(key).ok())?;

    tracing::info!("Signal agent starting");
    tracing::info!("  Symbols: {}", config.symbols.join(", "));
    tracing::info!("  Scan interval: {} seconds", config.scan_interval_seconds);
    tracing::info!("  Snapshot dir: {}", config.snapshot_dir.display());
    tracing::info!(
        "  Predictor: {:?} (model endpoint: {})",
        pipeline_config.predictor.strategy,
        config.ml.predictor_url.as_deref().unwrap_or("none")
    );

    let entry_window = chrono::Duration::hours(pipeline_config.decision.guard.window_hours);

    // 3. Pipeline and collaborators
    let mut pipeline = SignalPipeline::new(pipeline_config).context("invalid pipeline config")?;
    if let Some(estimator) = config.ml.estimator().context("cannot build ML client")? {
        // Warn-only: the predictor falls back to rules when the model is down
        match estimator.health().await {
            Ok(true) => tracing::info!("Startup check: ML predictor OK"),
            Ok(false) => tracing::warn!(
                "Startup check: ML predictor unhealthy, predictions will use rule-based fallback"
            ),
            Err(e) => tracing::warn!(
                "Startup check: ML predictor unreachable ({}), predictions will use rule-based fallback",
                e
            ),
        }
        pipeline = pipeline.with_estimator(Arc::new(estimator));
    }
    let pipeline = Arc::new(pipeline);

    let store: Arc<dyn OvertradingStore> = Arc::new(InMemoryOvertradingStore::new());
    let sink = Arc::new(PaperExecutionSink::new(
        store.clone(),
        entry_window,
        config.account_balance,
    ));
    let services = CycleServices {
        source: Arc::new(JsonSnapshotSource::new(&config.snapshot_dir)),
        store,
        sink: sink.clone(),
    };

    let mut agent_metrics = AgentMetrics::new(config.metrics_log_interval_cycles);

    // 4. Shutdown: the flag stops new symbols from starting, the notify
    //    wakes the idle loop.
    let cancel = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(Notify::new());
    {
        let cancel = cancel.clone();
        let stop = stop.clone();
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                }
            }
            cancel.store(true, Ordering::SeqCst);
            stop.notify_one();
        });
    }

    // 5. Main loop
    let mut interval = time::interval(Duration::from_secs(config.scan_interval_seconds));
    let mut cycle: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycle += 1;
                let cycle_start = AgentMetrics::start_timer();
                let started_at = chrono::Utc::now();
                sink.roll_session(started_at).await;
                let account = sink.account().await?;
                let ctx = CycleContext {
                    cycle,
                    started_at,
                    account,
                };

                match pipeline
                    .clone()
                    .run_cycle(ctx, &config.symbols, services.clone(), cancel.clone())
                    .await
                {
                    Ok(report) => agent_metrics.record_report(&report),
                    Err(e) => {
                        tracing::error!("Cycle {} failed: {}", cycle, e);
                        agent_metrics.record_failure();
                    }
                }
                agent_metrics.finish_cycle(cycle_start);

                if cancel.load(Ordering::SeqCst) {
                    tracing::info!("Shutdown requested during cycle {}, exiting gracefully...", cycle);
                    agent_metrics.log_metrics();
                    break;
                }
            }
            _ = stop.notified() => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                agent_metrics.log_metrics();
                break;
            }
        }
    }

    tracing::info!("Signal agent shut down.");
    Ok(())
}
