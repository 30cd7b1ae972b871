use analysis_orchestrator::CycleReport;
use std::collections::VecDeque;
use std::time::Instant;

const RECENT_WINDOW: usize = 20;

/// Running counters for the agent loop.
/// Tracks per-cycle timing, outcome totals and a rolling approval window.
pub struct AgentMetrics {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub signals_approved: u64,
    pub signals_vetoed: u64,
    pub signals_held: u64,
    pub symbols_degraded: u64,
    pub symbols_skipped: u64,
    pub last_total_duration_ms: u64,

    // Approvals per evaluated symbol, last 20 cycles
    recent_cycles: VecDeque<CycleSample>,
    log_interval_cycles: u64,
}

struct CycleSample {
    evaluated: usize,
    approved: usize,
}

impl AgentMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: 0,
            cycles_failed: 0,
            signals_approved: 0,
            signals_vetoed: 0,
            signals_held: 0,
            symbols_degraded: 0,
            symbols_skipped: 0,
            last_total_duration_ms: 0,
            recent_cycles: VecDeque::with_capacity(RECENT_WINDOW),
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_report(&mut self, report: &CycleReport) {
        self.signals_approved += report.approved as u64;
        self.signals_vetoed += report.vetoed as u64;
        self.signals_held += report.hold as u64;
        self.symbols_degraded += report.degraded as u64;
        self.symbols_skipped += report.skipped as u64;

        self.recent_cycles.push_back(CycleSample {
            evaluated: report.evaluated(),
            approved: report.approved,
        });
        if self.recent_cycles.len() > RECENT_WINDOW {
            self.recent_cycles.pop_front();
        }
    }

    pub fn record_failure(&mut self) {
        self.cycles_failed += 1;
    }

    pub fn finish_cycle(&mut self, cycle_start: Instant) {
        self.last_total_duration_ms = cycle_start.elapsed().as_millis() as u64;
        self.cycles_run += 1;

        if self.log_interval_cycles > 0 && self.cycles_run.is_multiple_of(self.log_interval_cycles)
        {
            self.log_metrics();
        }
    }

    /// Share of evaluated symbols approved over the recent window (0-100%)
    pub fn recent_approval_rate(&self) -> f64 {
        let evaluated: usize = self.recent_cycles.iter().map(|c| c.evaluated).sum();
        if evaluated == 0 {
            return 0.0;
        }
        let approved: usize = self.recent_cycles.iter().map(|c| c.approved).sum();
        (approved as f64 / evaluated as f64) * 100.0
    }

    /// Vetoes as a share of directional decisions (0-100%)
    pub fn veto_rate(&self) -> f64 {
        let directional = self.signals_approved + self.signals_vetoed;
        if directional == 0 {
            return 0.0;
        }
        (self.signals_vetoed as f64 / directional as f64) * 100.0
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_run,
            cycles_failed = self.cycles_failed,
            approved = self.signals_approved,
            vetoed = self.signals_vetoed,
            hold = self.signals_held,
            degraded = self.symbols_degraded,
            skipped = self.symbols_skipped,
            veto_rate = format!("{:.1}%", self.veto_rate()),
            recent_approval_rate = format!("{:.1}%", self.recent_approval_rate()),
            last_cycle_ms = self.last_total_duration_ms,
            "Agent metrics summary"
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles_run": self.cycles_run,
            "cycles_failed": self.cycles_failed,
            "signals_approved": self.signals_approved,
            "signals_vetoed": self.signals_vetoed,
            "signals_held": self.signals_held,
            "symbols_degraded": self.symbols_degraded,
            "symbols_skipped": self.symbols_skipped,
            "last_total_duration_ms": self.last_total_duration_ms,
        })
    }
}
