use analysis_core::{
    AccountSource, AccountState, AnalysisError, ExecutionSink, OpenPosition, OvertradingStore,
    PositionSide, RiskVerdict, TradeAction, TradeDecision, VetoReason,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct PaperBook {
    account: AccountState,
    /// UTC date of the session the daily counters belong to
    session: Option<NaiveDate>,
}

impl PaperBook {
    fn roll(&mut self, at: DateTime<Utc>) {
        let day = at.date_naive();
        if self.session == Some(day) {
            return;
        }
        if self.session.is_some() {
            info!(
                day = %day,
                pnl = self.account.daily_pnl,
                trades = self.account.trades_today,
                "New trading session, daily counters reset"
            );
            self.account.reset_session();
        }
        self.session = Some(day);
    }
}

/// Paper execution: logs every verdict, fills approved entries at the
/// decision price and records them in the overtrading store.
///
/// Also serves as the account source so later cycles see the fills.
pub struct PaperExecutionSink {
    store: Arc<dyn OvertradingStore>,
    entry_window: Duration,
    book: RwLock<PaperBook>,
}

impl PaperExecutionSink {
    pub fn new(store: Arc<dyn OvertradingStore>, entry_window: Duration, balance: f64) -> Self {
        Self {
            store,
            entry_window,
            book: RwLock::new(PaperBook {
                account: AccountState::with_cash(balance),
                session: None,
            }),
        }
    }

    fn side(action: TradeAction) -> Option<PositionSide> {
        match action {
            TradeAction::Long => Some(PositionSide::Long),
            TradeAction::Short => Some(PositionSide::Short),
            TradeAction::Hold => None,
        }
    }

    /// Reset the daily counters when `at` falls on a new UTC day.
    pub async fn roll_session(&self, at: DateTime<Utc>) {
        self.book.write().await.roll(at);
    }

    /// Manual override after a daily-loss halt.
    pub async fn deactivate_kill_switch(&self) {
        let mut book = self.book.write().await;
        if book.account.kill_switch {
            warn!("Kill switch deactivated manually");
        }
        book.account.deactivate_kill_switch();
    }

    /// Close the whole position in `symbol` at `exit_price` and book the
    /// result. Returns the realized PnL.
    pub async fn close(
        &self,
        symbol: &str,
        exit_price: f64,
        cycle: u64,
        at: DateTime<Utc>,
    ) -> Result<f64, AnalysisError> {
        let (side, pnl) = {
            let mut book = self.book.write().await;
            book.roll(at);
            let account = &mut book.account;
            let i = account
                .positions
                .iter()
                .position(|p| p.symbol == symbol)
                .ok_or_else(|| {
                    AnalysisError::InvalidData(format!("no open position in {}", symbol))
                })?;
            let held = account.positions.remove(i);
            let pnl = match held.side {
                PositionSide::Long => (exit_price - held.entry_price) * held.quantity,
                PositionSide::Short => (held.entry_price - exit_price) * held.quantity,
            };
            account.available_cash += held.entry_price * held.quantity;
            account.realize(pnl);
            (held.side, pnl)
        };

        let state = self
            .store
            .update(symbol, Box::new(move |s| s.record_exit(cycle, pnl, side)))
            .await;

        info!(
            symbol,
            side = ?side,
            exit = exit_price,
            pnl,
            consecutive_losses = state.consecutive_losses,
            "Paper position closed"
        );
        Ok(pnl)
    }
}

#[async_trait]
impl ExecutionSink for PaperExecutionSink {
    async fn submit(
        &self,
        cycle: u64,
        at: DateTime<Utc>,
        decision: &TradeDecision,
        verdict: &RiskVerdict,
    ) -> Result<(), AnalysisError> {
        let Some(side) = Self::side(decision.action) else {
            return Ok(());
        };
        if !verdict.passed {
            if let Some(VetoReason::DailyLossLimit { pnl }) = &verdict.deciding_reason {
                let mut book = self.book.write().await;
                if !book.account.kill_switch {
                    warn!(pnl = *pnl, "Daily loss limit reached, kill switch activated");
                    book.account.activate_kill_switch();
                }
            }
            debug!(symbol = %decision.symbol, "Vetoed decision not executed");
            return Ok(());
        }
        let params = verdict
            .corrected
            .clone()
            .or_else(|| decision.params.clone())
            .ok_or_else(|| {
                AnalysisError::InvalidData(format!(
                    "approved {} decision for {} has no trade parameters",
                    decision.action.name(),
                    decision.symbol
                ))
            })?;

        {
            let mut book = self.book.write().await;
            book.roll(at);
            let account = &mut book.account;
            let margin = params.notional / params.leverage.max(1.0);
            account.available_cash -= margin;
            account.trades_today += 1;
            let existing = account
                .positions
                .iter()
                .position(|p| p.symbol == decision.symbol && p.side == side);
            match existing {
                Some(i) => {
                    let held = &mut account.positions[i];
                    let quantity = held.quantity + params.quantity;
                    held.entry_price = (held.entry_price * held.quantity
                        + params.entry_price * params.quantity)
                        / quantity;
                    held.quantity = quantity;
                    held.stop_loss = Some(params.stop_loss);
                }
                None => account.positions.push(OpenPosition {
                    symbol: decision.symbol.clone(),
                    side,
                    quantity: params.quantity,
                    entry_price: params.entry_price,
                    stop_loss: Some(params.stop_loss),
                }),
            }
        }

        let window = self.entry_window;
        let state = self
            .store
            .update(
                &decision.symbol,
                Box::new(move |s| s.record_entry(cycle, at, window)),
            )
            .await;

        info!(
            symbol = %decision.symbol,
            action = decision.action.name(),
            quantity = params.quantity,
            entry = params.entry_price,
            stop = params.stop_loss,
            target = params.take_profit,
            corrected = verdict.corrected.is_some(),
            entries_in_window = state.entry_times.len(),
            "Paper order filled"
        );
        Ok(())
    }
}

#[async_trait]
impl AccountSource for PaperExecutionSink {
    async fn account(&self) -> Result<AccountState, AnalysisError> {
        Ok(self.book.read().await.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Alignment, DecisionContext, TradeParams};
    use chrono::TimeZone;
    use decision_engine::InMemoryOvertradingStore;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 15, 0, 0).unwrap()
    }

    fn params() -> TradeParams {
        TradeParams {
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: 106.0,
            quantity: 10.0,
            notional: 1_000.0,
            leverage: 1.0,
            atr: 1.0,
        }
    }

    fn decision(action: TradeAction) -> TradeDecision {
        TradeDecision {
            symbol: "AAPL".to_string(),
            action,
            confidence: 70.0,
            weighted_score: 40.0,
            alignment: Alignment::Strong,
            params: Some(params()),
            context: DecisionContext::default(),
            reasons: vec![],
            decided_at: at(),
        }
    }

    fn sink() -> (Arc<InMemoryOvertradingStore>, PaperExecutionSink) {
        let store = Arc::new(InMemoryOvertradingStore::new());
        let sink = PaperExecutionSink::new(store.clone(), Duration::hours(6), 50_000.0);
        (store, sink)
    }

    #[tokio::test]
    async fn test_approved_entry_is_recorded() {
        let (store, sink) = sink();
        sink.submit(3, at(), &decision(TradeAction::Long), &RiskVerdict::pass())
            .await
            .unwrap();

        let state = store.load("AAPL").await;
        assert_eq!(state.last_entry_cycle, Some(3));
        assert_eq!(state.entry_times, vec![at()]);

        let account = sink.account().await.unwrap();
        assert_eq!(account.available_cash, 49_000.0);
        assert_eq!(account.trades_today, 1);
        let position = account.position("AAPL").unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.quantity, 10.0);
    }

    #[tokio::test]
    async fn test_vetoed_entry_is_ignored() {
        let (store, sink) = sink();
        let mut verdict = RiskVerdict::pass();
        verdict.passed = false;
        sink.submit(3, at(), &decision(TradeAction::Short), &verdict)
            .await
            .unwrap();

        assert_eq!(store.load("AAPL").await.last_entry_cycle, None);
        assert!(sink.account().await.unwrap().positions.is_empty());
    }

    #[tokio::test]
    async fn test_corrected_params_win() {
        let (_, sink) = sink();
        let mut verdict = RiskVerdict::pass();
        verdict.corrected = Some(TradeParams {
            stop_loss: 97.5,
            ..params()
        });
        sink.submit(1, at(), &decision(TradeAction::Long), &verdict)
            .await
            .unwrap();

        let account = sink.account().await.unwrap();
        assert_eq!(account.position("AAPL").unwrap().stop_loss, Some(97.5));
    }

    #[tokio::test]
    async fn test_repeat_entry_averages_in() {
        let (_, sink) = sink();
        let long = decision(TradeAction::Long);
        sink.submit(1, at(), &long, &RiskVerdict::pass()).await.unwrap();

        let mut higher = long.clone();
        higher.params = Some(TradeParams {
            entry_price: 110.0,
            notional: 1_100.0,
            ..params()
        });
        sink.submit(6, at(), &higher, &RiskVerdict::pass()).await.unwrap();

        let account = sink.account().await.unwrap();
        assert_eq!(account.positions.len(), 1);
        let position = account.position("AAPL").unwrap();
        assert_eq!(position.quantity, 20.0);
        assert_eq!(position.entry_price, 105.0);
    }

    #[tokio::test]
    async fn test_losing_close_books_pnl_and_streak() {
        let (store, sink) = sink();
        sink.submit(1, at(), &decision(TradeAction::Short), &RiskVerdict::pass())
            .await
            .unwrap();

        let pnl = sink.close("AAPL", 103.0, 4, at()).await.unwrap();
        assert_eq!(pnl, -30.0);

        let account = sink.account().await.unwrap();
        assert!(account.positions.is_empty());
        assert_eq!(account.balance, 49_970.0);
        assert_eq!(account.available_cash, 49_970.0);
        assert_eq!(account.daily_pnl, -30.0);
        assert_eq!(account.peak_equity, 50_000.0);

        let state = store.load("AAPL").await;
        assert_eq!(state.consecutive_short_losses, 1);
        assert_eq!(state.last_loss_cycle, Some(4));

        assert!(sink.close("AAPL", 103.0, 5, at()).await.is_err());
    }

    #[tokio::test]
    async fn test_daily_loss_veto_trips_kill_switch() {
        let (_, sink) = sink();
        let verdict = RiskVerdict {
            passed: false,
            deciding_reason: Some(VetoReason::DailyLossLimit { pnl: -10_500.0 }),
            triggered: vec![],
            corrected: None,
            warnings: vec![],
        };
        sink.submit(7, at(), &decision(TradeAction::Long), &verdict)
            .await
            .unwrap();
        assert!(sink.account().await.unwrap().kill_switch);

        sink.deactivate_kill_switch().await;
        assert!(!sink.account().await.unwrap().kill_switch);
    }

    #[tokio::test]
    async fn test_new_day_resets_session_counters() {
        let (_, sink) = sink();
        sink.submit(1, at(), &decision(TradeAction::Long), &RiskVerdict::pass())
            .await
            .unwrap();
        sink.close("AAPL", 99.0, 2, at()).await.unwrap();
        {
            let account = sink.account().await.unwrap();
            assert_eq!(account.trades_today, 1);
            assert_eq!(account.daily_pnl, -10.0);
        }

        // same day: nothing changes
        sink.roll_session(at() + Duration::hours(3)).await;
        assert_eq!(sink.account().await.unwrap().trades_today, 1);

        sink.roll_session(at() + Duration::days(1)).await;
        let account = sink.account().await.unwrap();
        assert_eq!(account.trades_today, 0);
        assert_eq!(account.daily_pnl, 0.0);
        // the realized loss stays in equity
        assert_eq!(account.balance, 49_990.0);
    }
}
