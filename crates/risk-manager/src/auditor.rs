//! Ordered risk audit over a single TradeDecision.
//!
//! Rules run in cascade order and the first block ends the audit. The stop
//! rule corrects instead of blocking and the exposure rule only warns.

use analysis_core::{
    AccountState, AuditRule, OvertradingState, PositionSide, RangeZone, RegimeKind, RiskConfig,
    RiskVerdict, RuleOutcome, StopConfig, TradeAction, TradeDecision, TradeParams, TrapKind,
    VetoReason,
};
use rust_decimal::Decimal;
use tracing::debug;

use crate::correction::correct_stop;
use crate::margin;

/// Account and counter state the audit reads.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext<'a> {
    pub account: &'a AccountState,
    pub overtrading: &'a OvertradingState,
}

#[derive(Default)]
struct Trail {
    triggered: Vec<RuleOutcome>,
    warnings: Vec<String>,
    corrected: Option<TradeParams>,
}

impl Trail {
    fn warn(&mut self, rule: AuditRule, message: String) {
        self.warnings.push(message.clone());
        self.triggered.push(RuleOutcome::Warning { rule, message });
    }
}

pub struct RiskAuditor {
    config: RiskConfig,
    stop: StopConfig,
}

impl RiskAuditor {
    pub fn new(config: RiskConfig, stop: StopConfig) -> Self {
        Self { config, stop }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn audit(&self, decision: &TradeDecision, ctx: &AuditContext<'_>) -> RiskVerdict {
        if decision.is_hold() {
            return RiskVerdict::pass();
        }

        let mut trail = Trail::default();
        match self.cascade(decision, ctx, &mut trail) {
            Ok(()) => {
                debug!(
                    symbol = %decision.symbol,
                    corrected = trail.corrected.is_some(),
                    warnings = trail.warnings.len(),
                    "Risk audit passed"
                );
                RiskVerdict {
                    passed: true,
                    deciding_reason: None,
                    triggered: trail.triggered,
                    corrected: trail.corrected,
                    warnings: trail.warnings,
                }
            }
            Err(reason) => {
                debug!(
                    symbol = %decision.symbol,
                    rule = reason.rule().order(),
                    reason = %reason,
                    "Risk audit blocked"
                );
                trail.triggered.push(RuleOutcome::Blocked {
                    rule: reason.rule(),
                    reason: reason.clone(),
                });
                RiskVerdict {
                    passed: false,
                    deciding_reason: Some(reason),
                    triggered: trail.triggered,
                    corrected: None,
                    warnings: trail.warnings,
                }
            }
        }
    }

    fn cascade(
        &self,
        decision: &TradeDecision,
        ctx: &AuditContext<'_>,
        trail: &mut Trail,
    ) -> Result<(), VetoReason> {
        let side = match decision.action {
            TradeAction::Long => PositionSide::Long,
            TradeAction::Short => PositionSide::Short,
            TradeAction::Hold => return Ok(()),
        };
        let params = decision
            .params
            .as_ref()
            .ok_or(VetoReason::MissingParameters)?;

        self.check_account(ctx.account)?;
        self.check_regime(decision)?;
        if side == PositionSide::Short {
            self.check_short(decision, ctx.overtrading)?;
        }
        self.check_range_position(decision, side, trail)?;
        self.check_oscillator(decision, side)?;

        let atr_pct = decision.context.atr_pct.unwrap_or_else(|| {
            if params.entry_price > 0.0 {
                params.atr / params.entry_price * 100.0
            } else {
                0.0
            }
        });
        // Reward/risk is measured on the stop that would actually be placed
        let sanitized = correct_stop(params, side, atr_pct, &self.stop);
        let effective = sanitized.as_ref().unwrap_or(params);
        self.check_reward_risk(effective, side)?;
        check_existing_position(&decision.symbol, side, ctx.account)?;

        if let Some(fixed) = &sanitized {
            let message = format!(
                "stop {:.2} replaced by {:.2}",
                params.stop_loss, fixed.stop_loss
            );
            trail.triggered.push(RuleOutcome::Corrected {
                rule: AuditRule::StopLossSanity,
                message,
            });
            trail.corrected = Some(fixed.clone());
        }

        self.check_margin(effective, ctx.account)?;
        self.check_exposure(effective, ctx.account, trail);
        check_traps(decision, side)?;

        Ok(())
    }

    /// Account-level halts, then the balance floor.
    fn check_account(&self, account: &AccountState) -> Result<(), VetoReason> {
        let c = &self.config;
        if account.kill_switch {
            return Err(VetoReason::KillSwitchActive);
        }
        if account.daily_pnl <= -c.max_daily_loss {
            return Err(VetoReason::DailyLossLimit {
                pnl: account.daily_pnl,
            });
        }
        if account.trades_today >= c.max_trades_per_day {
            return Err(VetoReason::DailyTradeLimit {
                trades: account.trades_today,
            });
        }
        let drawdown_pct = account.drawdown_pct();
        if drawdown_pct >= c.max_drawdown_pct {
            return Err(VetoReason::MaxDrawdown { drawdown_pct });
        }
        if account.balance <= 0.0 || account.balance < c.min_balance {
            return Err(VetoReason::InsufficientBalance {
                balance: account.balance,
            });
        }
        Ok(())
    }

    fn check_regime(&self, decision: &TradeDecision) -> Result<(), VetoReason> {
        let Some(regime) = &decision.context.regime else {
            return Ok(());
        };
        let confidence = decision.confidence;
        match regime.kind {
            RegimeKind::Unknown => Err(VetoReason::UnknownRegime),
            RegimeKind::Volatile | RegimeKind::VolatileDirectionless
                if confidence < self.config.volatile_min_confidence =>
            {
                Err(VetoReason::LowConfidenceVolatile { confidence })
            }
            RegimeKind::Choppy if confidence < self.config.choppy_min_confidence => {
                Err(VetoReason::LowConfidenceChoppy { confidence })
            }
            _ => Ok(()),
        }
    }

    fn check_short(
        &self,
        decision: &TradeDecision,
        overtrading: &OvertradingState,
    ) -> Result<(), VetoReason> {
        let c = &self.config;
        if decision.confidence < c.short_min_confidence {
            return Err(VetoReason::ShortLowConfidence {
                confidence: decision.confidence,
            });
        }
        if decision.weighted_score.abs() < c.short_min_score {
            return Err(VetoReason::ShortWeakSetup {
                score: decision.weighted_score,
            });
        }
        if let Some(atr_pct) = decision.context.atr_pct {
            if atr_pct > c.short_max_atr_pct {
                return Err(VetoReason::ShortHighVolatility { atr_pct });
            }
        }
        if let Some(sentiment) = decision.context.sentiment {
            if sentiment > c.short_max_sentiment {
                return Err(VetoReason::ShortBullishSentiment { sentiment });
            }
        }
        if overtrading.consecutive_short_losses >= c.short_max_losses {
            return Err(VetoReason::ShortLossStreak {
                losses: overtrading.consecutive_short_losses,
            });
        }
        Ok(())
    }

    fn check_range_position(
        &self,
        decision: &TradeDecision,
        side: PositionSide,
        trail: &mut Trail,
    ) -> Result<(), VetoReason> {
        let Some(position) = &decision.context.position else {
            return Ok(());
        };
        if position.zone == RangeZone::Middle
            && decision.confidence < self.config.middle_zone_min_confidence
        {
            return Err(VetoReason::MiddleZoneLowConfidence {
                position_pct: position.pct,
                confidence: decision.confidence,
            });
        }
        let unfavorable = match side {
            PositionSide::Long => position.zone == RangeZone::Resistance,
            PositionSide::Short => position.zone == RangeZone::Support,
        };
        if unfavorable {
            return Err(VetoReason::UnfavorableExtreme {
                position_pct: position.pct,
            });
        }
        let allowed = match side {
            PositionSide::Long => position.allow_long,
            PositionSide::Short => position.allow_short,
        };
        if !allowed {
            trail.warn(
                AuditRule::PositionInRange,
                format!(
                    "{} entry from a range position that does not favor it ({:.0}%)",
                    decision.action.name(),
                    position.pct
                ),
            );
        }
        Ok(())
    }

    fn check_oscillator(
        &self,
        decision: &TradeDecision,
        side: PositionSide,
    ) -> Result<(), VetoReason> {
        let Some(rsi) = decision.context.rsi else {
            return Ok(());
        };
        match side {
            PositionSide::Long if rsi >= self.config.overbought_rsi => {
                Err(VetoReason::OverboughtLong { rsi })
            }
            PositionSide::Short if rsi <= self.config.oversold_rsi => {
                Err(VetoReason::OversoldShort { rsi })
            }
            _ => Ok(()),
        }
    }

    fn check_reward_risk(
        &self,
        params: &TradeParams,
        side: PositionSide,
    ) -> Result<(), VetoReason> {
        let ratio = params.reward_risk(side).unwrap_or(0.0);
        if ratio < self.config.min_reward_risk {
            return Err(VetoReason::PoorRewardRisk { ratio });
        }
        Ok(())
    }

    fn check_margin(&self, params: &TradeParams, account: &AccountState) -> Result<(), VetoReason> {
        if !(params.leverage > 0.0 && params.leverage <= self.config.max_leverage) {
            return Err(VetoReason::LeverageExceeded {
                leverage: params.leverage,
            });
        }
        let available = margin::available_margin(account);
        let required = margin::required_margin(params).unwrap_or(Decimal::MAX);
        if required > available {
            return Err(VetoReason::InsufficientMargin {
                required: required.to_string(),
                available: available.to_string(),
            });
        }
        Ok(())
    }

    fn check_exposure(&self, params: &TradeParams, account: &AccountState, trail: &mut Trail) {
        let position_pct = margin::to_f64(margin::position_pct(params, account));
        if position_pct > self.config.max_position_pct {
            trail.warn(
                AuditRule::Exposure,
                format!(
                    "position is {:.1}% of equity (limit {:.0}%)",
                    position_pct, self.config.max_position_pct
                ),
            );
        }

        let risk_pct = margin::to_f64(margin::portfolio_risk_pct(params, account));
        if risk_pct > self.config.max_portfolio_risk_pct {
            trail.warn(
                AuditRule::Exposure,
                format!(
                    "portfolio risk would be {:.1}% of equity (limit {:.0}%)",
                    risk_pct, self.config.max_portfolio_risk_pct
                ),
            );
        }
    }
}

impl Default for RiskAuditor {
    fn default() -> Self {
        Self::new(RiskConfig::default(), StopConfig::default())
    }
}

fn check_existing_position(
    symbol: &str,
    side: PositionSide,
    account: &AccountState,
) -> Result<(), VetoReason> {
    match account.position(symbol) {
        Some(open) if open.side == side => Err(VetoReason::DuplicatePosition),
        Some(_) => Err(VetoReason::ReversePosition),
        None => Ok(()),
    }
}

fn check_traps(decision: &TradeDecision, side: PositionSide) -> Result<(), VetoReason> {
    let Some(traps) = &decision.context.traps else {
        return Ok(());
    };
    let against: &[TrapKind] = match side {
        PositionSide::Long => &[TrapKind::BullTrapRisk, TrapKind::FomoTop],
        PositionSide::Short => &[TrapKind::PanicBottom],
    };
    match against.iter().find(|k| traps.is_set(**k)) {
        Some(kind) => Err(VetoReason::TrapPattern {
            trap: kind.name().to_string(),
        }),
        None => Ok(()),
    }
}
