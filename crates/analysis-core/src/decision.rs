use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PositionSide, PricePosition, RegimeState, TrapFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Long,
    Short,
    Hold,
}

impl TradeAction {
    pub fn name(&self) -> &'static str {
        match self {
            TradeAction::Long => "long",
            TradeAction::Short => "short",
            TradeAction::Hold => "hold",
        }
    }

    /// +1 for long, -1 for short, 0 for hold
    pub fn sign(&self) -> f64 {
        match self {
            TradeAction::Long => 1.0,
            TradeAction::Short => -1.0,
            TradeAction::Hold => 0.0,
        }
    }
}

/// Agreement of trend direction across timeframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Strong,
    Partial,
    None,
}

impl Alignment {
    pub fn is_aligned(&self) -> bool {
        !matches!(self, Alignment::None)
    }
}

/// Proposed order parameters attached to a directional decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Whole shares
    pub quantity: f64,
    pub notional: f64,
    pub leverage: f64,
    /// ATR at decision time, used for stop correction
    pub atr: f64,
}

impl TradeParams {
    pub fn stop_distance_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.entry_price - self.stop_loss).abs() / self.entry_price * 100.0
    }

    pub fn take_profit_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (self.take_profit - self.entry_price).abs() / self.entry_price * 100.0
    }

    /// Reward distance over risk distance for a trade on `side`.
    ///
    /// None unless the stop sits below entry and the target above it for a
    /// long (mirrored for a short).
    pub fn reward_risk(&self, side: PositionSide) -> Option<f64> {
        let (reward, risk) = match side {
            PositionSide::Long => (
                self.take_profit - self.entry_price,
                self.entry_price - self.stop_loss,
            ),
            PositionSide::Short => (
                self.entry_price - self.take_profit,
                self.stop_loss - self.entry_price,
            ),
        };
        if risk <= f64::EPSILON || reward <= 0.0 {
            return None;
        }
        Some(reward / risk)
    }
}

/// Stage outputs the decision was made from, kept for the audit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionContext {
    pub regime: Option<RegimeState>,
    pub position: Option<PricePosition>,
    pub traps: Option<TrapFlags>,
    pub sentiment: Option<f64>,
    /// Oscillator reading used for contradiction checks
    pub rsi: Option<f64>,
    pub atr_pct: Option<f64>,
    pub volume_ratio: Option<f64>,
}

/// Decision Engine output; consumed once by the Risk Auditor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub symbol: String,
    pub action: TradeAction,
    /// 0..100
    pub confidence: f64,
    pub weighted_score: f64,
    pub alignment: Alignment,
    pub params: Option<TradeParams>,
    pub context: DecisionContext,
    pub reasons: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

impl TradeDecision {
    pub fn hold(
        symbol: impl Into<String>,
        confidence: f64,
        weighted_score: f64,
        reason: impl Into<String>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            action: TradeAction::Hold,
            confidence,
            weighted_score,
            alignment: Alignment::None,
            params: None,
            context: DecisionContext::default(),
            reasons: vec![reason.into()],
            decided_at,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == TradeAction::Hold
    }
}
