use analysis_core::{
    AccountState, AnalysisError, AnalysisResult, BarSource, ExecutionSink, OvertradingStore,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::pipeline::{SignalPipeline, SymbolOutcome};

/// Per-cycle inputs shared by every symbol.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub account: AccountState,
}

/// Collaborators a cycle talks to.
#[derive(Clone)]
pub struct CycleServices {
    pub source: Arc<dyn BarSource>,
    pub store: Arc<dyn OvertradingStore>,
    pub sink: Arc<dyn ExecutionSink>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub approved: usize,
    pub vetoed: usize,
    pub hold: usize,
    pub degraded: usize,
    /// Not started because the cycle was cancelled
    pub skipped: usize,
    pub outcomes: Vec<SymbolOutcome>,
}

impl CycleReport {
    fn record(&mut self, outcome: SymbolOutcome) {
        match &outcome {
            SymbolOutcome::Approved { .. } => self.approved += 1,
            SymbolOutcome::Vetoed { .. } => self.vetoed += 1,
            SymbolOutcome::Hold { .. } => self.hold += 1,
            SymbolOutcome::Degraded { .. } => self.degraded += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn evaluated(&self) -> usize {
        self.approved + self.vetoed + self.hold + self.degraded
    }
}

enum SymbolRun {
    Done(SymbolOutcome),
    Skipped,
}

impl SignalPipeline {
    /// Evaluate every symbol concurrently.
    ///
    /// The cancel flag is checked before a symbol starts, never inside its
    /// pipeline. Only a Configuration error fails the cycle; every other
    /// failure degrades that one symbol.
    pub async fn run_cycle(
        self: Arc<Self>,
        ctx: CycleContext,
        symbols: &[String],
        services: CycleServices,
        cancel: Arc<AtomicBool>,
    ) -> AnalysisResult<CycleReport> {
        let mut report = CycleReport {
            cycle: ctx.cycle,
            ..Default::default()
        };
        let ctx = Arc::new(ctx);
        let permits = Arc::new(Semaphore::new(symbols.len().max(1)));
        let mut tasks = JoinSet::new();

        for symbol in symbols {
            if cancel.load(Ordering::SeqCst) {
                report.skipped += 1;
                continue;
            }

            let pipeline = self.clone();
            let ctx = ctx.clone();
            let services = services.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            let symbol = symbol.clone();

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Ok(SymbolRun::Skipped);
                };
                if cancel.load(Ordering::SeqCst) {
                    debug!(symbol = %symbol, "Cycle cancelled before symbol started");
                    return Ok(SymbolRun::Skipped);
                }
                pipeline.run_symbol(&ctx, &symbol, &services).await.map(SymbolRun::Done)
            });
        }

        let mut fatal: Option<AnalysisError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(SymbolRun::Done(outcome))) => report.record(outcome),
                Ok(Ok(SymbolRun::Skipped)) => report.skipped += 1,
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(join_error) => {
                    warn!(error = %join_error, outcome = "degraded", "Symbol task failed");
                    report.degraded += 1;
                }
            }
        }

        if let Some(e) = fatal {
            error!(cycle = ctx.cycle, error = %e, outcome = "failed", "Cycle failed");
            return Err(e);
        }

        info!(
            cycle = report.cycle,
            approved = report.approved,
            vetoed = report.vetoed,
            hold = report.hold,
            degraded = report.degraded,
            skipped = report.skipped,
            "Cycle complete"
        );
        Ok(report)
    }

    /// Fetch, evaluate and hand off one symbol. Err only for fatal errors.
    async fn run_symbol(
        &self,
        ctx: &CycleContext,
        symbol: &str,
        services: &CycleServices,
    ) -> AnalysisResult<SymbolOutcome> {
        let snapshot = match self.builder.build(services.source.as_ref(), symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let outcome = SymbolOutcome::degraded(symbol, &e);
                warn!(
                    symbol,
                    outcome = "degraded",
                    kind = e.kind(),
                    reason = %e,
                    "Snapshot unavailable"
                );
                return Ok(outcome);
            }
        };

        let overtrading = services.store.load(symbol).await;
        let outcome = self
            .evaluate(&snapshot, &ctx.account, &overtrading, ctx.cycle)
            .await;

        if let Some((decision, verdict)) = outcome.pair() {
            match services
                .sink
                .submit(ctx.cycle, ctx.started_at, decision, verdict)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(symbol, error = %e, "Execution sink rejected decision"),
            }
        }
        Ok(outcome)
    }
}
