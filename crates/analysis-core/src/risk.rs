use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TradeParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open position held by the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
}

impl OpenPosition {
    /// Loss if the stop is hit; full notional when no stop is set
    pub fn open_risk(&self) -> f64 {
        match self.stop_loss {
            Some(stop) => (self.entry_price - stop).abs() * self.quantity,
            None => self.entry_price * self.quantity,
        }
    }
}

/// Account view supplied by the execution side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountState {
    /// Total equity
    pub balance: f64,
    /// Cash not tied up in margin
    pub available_cash: f64,
    #[serde(default)]
    pub positions: Vec<OpenPosition>,
    /// Realized PnL since the session opened
    #[serde(default)]
    pub daily_pnl: f64,
    /// Entries filled since the session opened
    #[serde(default)]
    pub trades_today: u32,
    /// Highest equity seen; zero means unknown
    #[serde(default)]
    pub peak_equity: f64,
    /// Set after the daily loss limit is hit; cleared manually or on a new session
    #[serde(default)]
    pub kill_switch: bool,
}

impl AccountState {
    pub fn with_cash(balance: f64) -> Self {
        Self {
            balance,
            available_cash: balance,
            peak_equity: balance,
            ..Self::default()
        }
    }

    /// Percent below peak equity, zero when no peak is known
    pub fn drawdown_pct(&self) -> f64 {
        let peak = self.peak_equity.max(self.balance);
        if peak <= 0.0 {
            return 0.0;
        }
        (peak - self.balance) / peak * 100.0
    }

    /// Book a realized result against equity and the session tally.
    pub fn realize(&mut self, pnl: f64) {
        self.balance += pnl;
        self.available_cash += pnl;
        self.daily_pnl += pnl;
        self.peak_equity = self.peak_equity.max(self.balance);
    }

    pub fn activate_kill_switch(&mut self) {
        self.kill_switch = true;
    }

    pub fn deactivate_kill_switch(&mut self) {
        self.kill_switch = false;
    }

    /// Start a new trading session
    pub fn reset_session(&mut self) {
        self.daily_pnl = 0.0;
        self.trades_today = 0;
        self.kill_switch = false;
    }

    pub fn position(&self, symbol: &str) -> Option<&OpenPosition> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn open_risk(&self) -> f64 {
        self.positions.iter().map(|p| p.open_risk()).sum()
    }
}

/// Rule in the audit cascade, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditRule {
    NoAction,
    Balance,
    RegimeConfidence,
    ShortGate,
    PositionInRange,
    OscillatorContradiction,
    RewardRisk,
    ExistingPosition,
    StopLossSanity,
    Margin,
    Exposure,
    TrapAudit,
}

impl AuditRule {
    /// 1-based position in the cascade
    pub fn order(&self) -> u8 {
        *self as u8 + 1
    }
}

/// Why a decision was blocked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum VetoReason {
    MissingParameters,
    InsufficientBalance { balance: f64 },
    KillSwitchActive,
    DailyLossLimit { pnl: f64 },
    DailyTradeLimit { trades: u32 },
    MaxDrawdown { drawdown_pct: f64 },
    UnknownRegime,
    LowConfidenceVolatile { confidence: f64 },
    LowConfidenceChoppy { confidence: f64 },
    ShortLowConfidence { confidence: f64 },
    ShortWeakSetup { score: f64 },
    ShortHighVolatility { atr_pct: f64 },
    ShortBullishSentiment { sentiment: f64 },
    ShortLossStreak { losses: u32 },
    MiddleZoneLowConfidence { position_pct: f64, confidence: f64 },
    UnfavorableExtreme { position_pct: f64 },
    OverboughtLong { rsi: f64 },
    OversoldShort { rsi: f64 },
    PoorRewardRisk { ratio: f64 },
    DuplicatePosition,
    ReversePosition,
    InsufficientMargin { required: String, available: String },
    LeverageExceeded { leverage: f64 },
    TrapPattern { trap: String },
}

impl VetoReason {
    /// Fatal reasons block regardless of any other input
    pub fn is_fatal(&self) -> bool {
        matches!(self, VetoReason::ReversePosition)
    }

    pub fn rule(&self) -> AuditRule {
        match self {
            VetoReason::MissingParameters => AuditRule::NoAction,
            VetoReason::InsufficientBalance { .. }
            | VetoReason::KillSwitchActive
            | VetoReason::DailyLossLimit { .. }
            | VetoReason::DailyTradeLimit { .. }
            | VetoReason::MaxDrawdown { .. } => AuditRule::Balance,
            VetoReason::UnknownRegime
            | VetoReason::LowConfidenceVolatile { .. }
            | VetoReason::LowConfidenceChoppy { .. } => AuditRule::RegimeConfidence,
            VetoReason::ShortLowConfidence { .. }
            | VetoReason::ShortWeakSetup { .. }
            | VetoReason::ShortHighVolatility { .. }
            | VetoReason::ShortBullishSentiment { .. }
            | VetoReason::ShortLossStreak { .. } => AuditRule::ShortGate,
            VetoReason::MiddleZoneLowConfidence { .. } | VetoReason::UnfavorableExtreme { .. } => {
                AuditRule::PositionInRange
            }
            VetoReason::OverboughtLong { .. } | VetoReason::OversoldShort { .. } => {
                AuditRule::OscillatorContradiction
            }
            VetoReason::PoorRewardRisk { .. } => AuditRule::RewardRisk,
            VetoReason::DuplicatePosition | VetoReason::ReversePosition => {
                AuditRule::ExistingPosition
            }
            VetoReason::InsufficientMargin { .. } | VetoReason::LeverageExceeded { .. } => {
                AuditRule::Margin
            }
            VetoReason::TrapPattern { .. } => AuditRule::TrapAudit,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            VetoReason::MissingParameters => "missing_parameters",
            VetoReason::InsufficientBalance { .. } => "insufficient_balance",
            VetoReason::KillSwitchActive => "kill_switch_active",
            VetoReason::DailyLossLimit { .. } => "daily_loss_limit",
            VetoReason::DailyTradeLimit { .. } => "daily_trade_limit",
            VetoReason::MaxDrawdown { .. } => "max_drawdown",
            VetoReason::UnknownRegime => "unknown_regime",
            VetoReason::LowConfidenceVolatile { .. } => "low_confidence_volatile",
            VetoReason::LowConfidenceChoppy { .. } => "low_confidence_choppy",
            VetoReason::ShortLowConfidence { .. } => "short_low_confidence",
            VetoReason::ShortWeakSetup { .. } => "short_weak_setup",
            VetoReason::ShortHighVolatility { .. } => "short_high_volatility",
            VetoReason::ShortBullishSentiment { .. } => "short_bullish_sentiment",
            VetoReason::ShortLossStreak { .. } => "short_loss_streak",
            VetoReason::MiddleZoneLowConfidence { .. } => "middle_zone_low_confidence",
            VetoReason::UnfavorableExtreme { .. } => "unfavorable_extreme",
            VetoReason::OverboughtLong { .. } => "overbought_long",
            VetoReason::OversoldShort { .. } => "oversold_short",
            VetoReason::PoorRewardRisk { .. } => "poor_reward_risk",
            VetoReason::DuplicatePosition => "duplicate_position",
            VetoReason::ReversePosition => "reverse_position",
            VetoReason::InsufficientMargin { .. } => "insufficient_margin",
            VetoReason::LeverageExceeded { .. } => "leverage_exceeded",
            VetoReason::TrapPattern { .. } => "trap_pattern",
        }
    }
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VetoReason::MissingParameters => {
                write!(f, "directional decision without trade parameters")
            }
            VetoReason::InsufficientBalance { balance } => {
                write!(f, "balance {:.2} below trading minimum", balance)
            }
            VetoReason::KillSwitchActive => write!(f, "kill switch active"),
            VetoReason::DailyLossLimit { pnl } => {
                write!(f, "daily loss {:.2} reached the limit", pnl)
            }
            VetoReason::DailyTradeLimit { trades } => {
                write!(f, "{} trades today, daily cap reached", trades)
            }
            VetoReason::MaxDrawdown { drawdown_pct } => {
                write!(f, "drawdown {:.2}% at the halt level", drawdown_pct)
            }
            VetoReason::UnknownRegime => write!(f, "market regime unknown"),
            VetoReason::LowConfidenceVolatile { confidence } => {
                write!(f, "volatile regime with confidence {:.0}", confidence)
            }
            VetoReason::LowConfidenceChoppy { confidence } => {
                write!(f, "choppy regime with confidence {:.0}", confidence)
            }
            VetoReason::ShortLowConfidence { confidence } => {
                write!(f, "short confidence {:.0} below short minimum", confidence)
            }
            VetoReason::ShortWeakSetup { score } => {
                write!(f, "short setup score {:.1} too weak", score)
            }
            VetoReason::ShortHighVolatility { atr_pct } => {
                write!(f, "ATR {:.2}% too high for a short", atr_pct)
            }
            VetoReason::ShortBullishSentiment { sentiment } => {
                write!(f, "sentiment {:.1} is bullish", sentiment)
            }
            VetoReason::ShortLossStreak { losses } => {
                write!(f, "{} consecutive losing shorts", losses)
            }
            VetoReason::MiddleZoneLowConfidence {
                position_pct,
                confidence,
            } => write!(
                f,
                "middle of range ({:.0}%) with confidence {:.0}",
                position_pct, confidence
            ),
            VetoReason::UnfavorableExtreme { position_pct } => {
                write!(f, "entry at unfavorable range extreme ({:.0}%)", position_pct)
            }
            VetoReason::OverboughtLong { rsi } => write!(f, "long into overbought RSI {:.1}", rsi),
            VetoReason::OversoldShort { rsi } => write!(f, "short into oversold RSI {:.1}", rsi),
            VetoReason::PoorRewardRisk { ratio } => write!(f, "reward/risk {:.2} too low", ratio),
            VetoReason::DuplicatePosition => write!(f, "position already open in this direction"),
            VetoReason::ReversePosition => {
                write!(f, "opposite-direction position already open")
            }
            VetoReason::InsufficientMargin {
                required,
                available,
            } => write!(f, "margin {} exceeds available {}", required, available),
            VetoReason::LeverageExceeded { leverage } => {
                write!(f, "leverage {:.1}x above limit", leverage)
            }
            VetoReason::TrapPattern { trap } => write!(f, "{} against trade direction", trap),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleOutcome {
    Blocked { rule: AuditRule, reason: VetoReason },
    Warning { rule: AuditRule, message: String },
    Corrected { rule: AuditRule, message: String },
}

impl RuleOutcome {
    pub fn rule(&self) -> AuditRule {
        match self {
            RuleOutcome::Blocked { rule, .. }
            | RuleOutcome::Warning { rule, .. }
            | RuleOutcome::Corrected { rule, .. } => *rule,
        }
    }
}

/// Final audit result for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub passed: bool,
    pub deciding_reason: Option<VetoReason>,
    /// Everything that fired, in cascade order
    pub triggered: Vec<RuleOutcome>,
    /// Parameters after auto-correction, when a correction applied
    pub corrected: Option<TradeParams>,
    pub warnings: Vec<String>,
}

impl RiskVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            deciding_reason: None,
            triggered: Vec::new(),
            corrected: None,
            warnings: Vec::new(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.passed
    }

    pub fn is_fatal(&self) -> bool {
        self.deciding_reason
            .as_ref()
            .map(|r| r.is_fatal())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order_matches_cascade() {
        assert_eq!(AuditRule::NoAction.order(), 1);
        assert_eq!(AuditRule::ShortGate.order(), 4);
        assert_eq!(AuditRule::RewardRisk.order(), 7);
        assert_eq!(AuditRule::TrapAudit.order(), 12);
        assert!(AuditRule::ShortGate < AuditRule::RewardRisk);
    }

    #[test]
    fn test_only_reverse_position_is_fatal() {
        assert!(VetoReason::ReversePosition.is_fatal());
        assert!(!VetoReason::DuplicatePosition.is_fatal());
        assert_eq!(
            VetoReason::ShortLossStreak { losses: 2 }.rule(),
            AuditRule::ShortGate
        );
        assert_eq!(VetoReason::PoorRewardRisk { ratio: 1.1 }.code(), "poor_reward_risk");
    }

    #[test]
    fn test_account_open_risk() {
        let mut account = AccountState::with_cash(100_000.0);
        account.positions.push(OpenPosition {
            symbol: "HDFCBANK".into(),
            side: PositionSide::Long,
            quantity: 10.0,
            entry_price: 1500.0,
            stop_loss: Some(1470.0),
        });
        assert!((account.open_risk() - 300.0).abs() < 1e-9);
        assert!(account.position("HDFCBANK").is_some());
        assert!(account.position("ITC").is_none());
    }

    #[test]
    fn test_session_tally_and_drawdown() {
        let mut account = AccountState::with_cash(100_000.0);
        account.realize(2_000.0);
        assert_eq!(account.peak_equity, 102_000.0);
        account.realize(-7_100.0);
        assert!((account.daily_pnl + 5_100.0).abs() < 1e-9);
        assert!((account.drawdown_pct() - 6.960_784_313_725_49).abs() < 1e-9);

        account.trades_today = 4;
        account.activate_kill_switch();
        account.reset_session();
        assert_eq!(account.daily_pnl, 0.0);
        assert_eq!(account.trades_today, 0);
        assert!(!account.kill_switch);
        // the peak survives the session roll
        assert_eq!(account.peak_equity, 102_000.0);
        assert_eq!(
            VetoReason::MaxDrawdown { drawdown_pct: 6.0 }.rule(),
            AuditRule::Balance
        );
    }
}
