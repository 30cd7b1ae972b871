use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AccountState, AnalysisError, Horizon, OvertradingState, RiskVerdict, Timeframe,
    TimeframeSeries, TradeDecision,
};

/// Data-acquisition collaborator. Must return closed bars in chronological order.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch_series(
        &self,
        symbol: &str,
        horizon: Horizon,
        timeframe: Timeframe,
    ) -> Result<TimeframeSeries, AnalysisError>;
}

/// Account balances and open positions
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn account(&self) -> Result<AccountState, AnalysisError>;
}

/// Per-symbol overtrading counters with compare-and-update semantics.
#[async_trait]
pub trait OvertradingStore: Send + Sync {
    async fn load(&self, symbol: &str) -> OvertradingState;

    /// Write `state` only if the stored version still equals `expected_version`.
    /// Returns false when another writer got there first.
    async fn compare_and_update(
        &self,
        symbol: &str,
        expected_version: u64,
        state: OvertradingState,
    ) -> bool;

    /// Apply `f` under the symbol's exclusive lock and return the new state.
    async fn update(
        &self,
        symbol: &str,
        f: Box<dyn for<'a> FnOnce(&'a mut OvertradingState) + Send>,
    ) -> OvertradingState;
}

/// Receives every decision/verdict pair; turns approved ones into orders.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn submit(
        &self,
        cycle: u64,
        at: DateTime<Utc>,
        decision: &TradeDecision,
        verdict: &RiskVerdict,
    ) -> Result<(), AnalysisError>;
}
