//! Property tests for the audit cascade and the stop correction.

use analysis_core::{
    AccountState, Alignment, AuditRule, DecisionContext, OpenPosition, OvertradingState,
    PositionSide, StopConfig, TradeAction, TradeDecision, TradeParams,
};
use chrono::Utc;
use proptest::prelude::*;
use risk_manager::{correct_stop, stop_is_sane, AuditContext, RiskAuditor};

// ── Strategies ───────────────────────────────────────────────────────

fn arb_side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

fn arb_params() -> impl Strategy<Value = TradeParams> {
    (10.0..1_000.0_f64, -0.2..0.2_f64, 0.0..0.3_f64, 1.0..500.0_f64).prop_map(
        |(entry, stop_offset, tp_offset, quantity)| TradeParams {
            entry_price: entry,
            stop_loss: entry * (1.0 + stop_offset),
            take_profit: entry * (1.0 + tp_offset),
            quantity: quantity.floor(),
            notional: quantity.floor() * entry,
            leverage: 1.0,
            atr: entry * 0.01,
        },
    )
}

fn decision(action: TradeAction, confidence: f64, score: f64, params: TradeParams) -> TradeDecision {
    TradeDecision {
        symbol: "PROP".into(),
        action,
        confidence,
        weighted_score: score,
        alignment: Alignment::None,
        params: Some(params),
        context: DecisionContext::default(),
        reasons: vec!["generated".into()],
        decided_at: Utc::now(),
    }
}

// ── Stop correction ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn correction_is_idempotent(
        params in arb_params(),
        side in arb_side(),
        atr_pct in 0.0..8.0_f64,
    ) {
        let stop = StopConfig::default();
        let once = correct_stop(&params, side, atr_pct, &stop).unwrap_or(params);
        prop_assert!(stop_is_sane(&once, side, &stop));
        let twice = correct_stop(&once, side, atr_pct, &stop).unwrap_or_else(|| once.clone());
        prop_assert_eq!(once, twice);
    }
}

// ── Cascade order ────────────────────────────────────────────────────

proptest! {
    /// A short failing both the short gate and the reward/risk floor is
    /// always reported against the short gate.
    #[test]
    fn short_gate_beats_reward_risk(
        confidence in 0.0..74.0_f64,
        entry in 20.0..500.0_f64,
    ) {
        let params = TradeParams {
            entry_price: entry,
            stop_loss: entry * 1.02,
            take_profit: entry * 0.99,
            quantity: 10.0,
            notional: entry * 10.0,
            leverage: 1.0,
            atr: entry * 0.01,
        };
        let d = decision(TradeAction::Short, confidence, -40.0, params);
        let account = AccountState::with_cash(1_000_000.0);
        let overtrading = OvertradingState::default();

        let verdict = RiskAuditor::default().audit(&d, &AuditContext { account: &account, overtrading: &overtrading });
        prop_assert!(verdict.is_blocked());
        prop_assert_eq!(verdict.deciding_reason.map(|r| r.rule()), Some(AuditRule::ShortGate));
    }

    /// Opening against an existing position never passes.
    #[test]
    fn reverse_position_always_blocked(
        side in arb_side(),
        confidence in 0.0..100.0_f64,
        score in -100.0..100.0_f64,
        params in arb_params(),
    ) {
        let (action, held) = match side {
            PositionSide::Long => (TradeAction::Long, PositionSide::Short),
            PositionSide::Short => (TradeAction::Short, PositionSide::Long),
        };
        let mut account = AccountState::with_cash(1_000_000.0);
        account.positions.push(OpenPosition {
            symbol: "PROP".into(),
            side: held,
            quantity: 5.0,
            entry_price: params.entry_price,
            stop_loss: None,
        });
        let overtrading = OvertradingState::default();
        let d = decision(action, confidence, score, params);

        let verdict = RiskAuditor::default().audit(&d, &AuditContext { account: &account, overtrading: &overtrading });
        prop_assert!(!verdict.passed);
    }

    /// A misplaced stop is judged after correction, so a long with a
    /// healthy target never fails the reward/risk floor because of it.
    #[test]
    fn reward_risk_sees_the_corrected_stop(
        entry in 10.0..1_000.0_f64,
        stop_offset in -0.2..0.2_f64,
        tp_offset in 0.05..0.3_f64,
        quantity in 1.0..500.0_f64,
    ) {
        let params = TradeParams {
            entry_price: entry,
            stop_loss: entry * (1.0 + stop_offset),
            take_profit: entry * (1.0 + tp_offset),
            quantity: quantity.floor(),
            notional: quantity.floor() * entry,
            leverage: 1.0,
            atr: entry * 0.01,
        };
        let d = decision(TradeAction::Long, 85.0, 30.0, params);
        let account = AccountState::with_cash(1_000_000.0);
        let overtrading = OvertradingState::default();

        let verdict = RiskAuditor::default().audit(&d, &AuditContext { account: &account, overtrading: &overtrading });
        prop_assert!(verdict.passed, "blocked: {:?}", verdict.deciding_reason);
    }

    /// Exposure limits only ever add warnings.
    #[test]
    fn exposure_never_blocks(balance in 1_000.0..30_000.0_f64) {
        let params = TradeParams {
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: 106.0,
            quantity: 9.0,
            notional: 900.0,
            leverage: 1.0,
            atr: 1.0,
        };
        let d = decision(TradeAction::Long, 85.0, 30.0, params);
        let account = AccountState::with_cash(balance);
        let overtrading = OvertradingState::default();

        let verdict = RiskAuditor::default().audit(&d, &AuditContext { account: &account, overtrading: &overtrading });
        prop_assert!(verdict.passed);
        prop_assert!(verdict.triggered.iter().all(|o| o.rule() == AuditRule::Exposure));
    }
}
