//! Per-symbol decision state machine.
//!
//! guard -> weighted score -> early filter -> alignment -> regime branch
//! -> secondary filters -> confidence banding -> trade parameters.
//! Every step can end the machine in `Hold`; the engine never writes
//! overtrading state.

use analysis_core::{
    ActionThresholds, Alignment, DecisionConfig, DecisionContext, Horizon, OvertradingState,
    Prediction, PricePosition, RangeZone, RegimeKind, RegimeState, ScoreSet, SnapshotScores,
    StopConfig, TradeAction, TradeDecision, TrapFlags, TrapKind,
};
use chrono::{DateTime, Utc};
use multi_timeframe::trend_alignment;
use tracing::{debug, info};

use crate::guard::OvertradingGuard;
use crate::params::{plan_trade, PlanInputs};
use crate::weights::{weighted_score, VoteInputs};

/// Everything one symbol's decision is made from. Stages disabled by the
/// capability manifest arrive as `None`.
pub struct DecisionInputs<'a> {
    pub symbol: &'a str,
    pub cycle: u64,
    pub now: DateTime<Utc>,
    pub primary: Horizon,
    pub scores: &'a SnapshotScores,
    pub regime: Option<&'a RegimeState>,
    pub position: Option<&'a PricePosition>,
    pub traps: Option<&'a TrapFlags>,
    pub prediction: Option<&'a Prediction>,
    pub overtrading: &'a OvertradingState,
}

/// Candidate action from the regime branch, before filters
struct Candidate {
    action: TradeAction,
    base_confidence: Option<f64>,
    threshold: f64,
    reason: String,
}

pub struct DecisionEngine {
    config: DecisionConfig,
    stop: StopConfig,
    guard: OvertradingGuard,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, stop: StopConfig) -> Self {
        Self {
            guard: OvertradingGuard::new(config.guard.clone()),
            config,
            stop,
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    pub fn decide(&self, input: &DecisionInputs<'_>) -> TradeDecision {
        let cfg = &self.config;
        let hold = |confidence: f64, score: f64, reason: String| {
            TradeDecision::hold(input.symbol, confidence, score, reason, input.now)
        };

        // 1. guard
        if let Err(block) = self.guard.check(input.overtrading, input.cycle, input.now) {
            debug!(symbol = input.symbol, reason = %block, "Overtrading guard");
            return hold(cfg.hold_confidence, 0.0, format!("overtrading guard: {}", block));
        }

        let Some(primary) = input.scores.get(input.primary) else {
            return hold(
                0.0,
                0.0,
                format!("{} timeframe has insufficient data", input.primary),
            );
        };
        let context = build_context(input, primary);
        let with_context = |mut d: TradeDecision, alignment: Alignment| {
            d.context = context.clone();
            d.alignment = alignment;
            d
        };

        // 2. weighted score
        let votes = VoteInputs::from_scores(input.scores, input.prediction);
        if !votes.has_trend() {
            return with_context(
                hold(0.0, 0.0, "no timeframe has a trend score".to_string()),
                Alignment::None,
            );
        }
        let score = weighted_score(&votes, &cfg.weights);
        let regime_kind = input.regime.map(|r| r.kind);

        // 3. early filter
        if regime_kind == Some(RegimeKind::Choppy)
            && input.position.map(|p| p.zone) == Some(RangeZone::Middle)
            && score.abs() < cfg.early_filter_min_score
        {
            return with_context(
                hold(
                    cfg.early_filter_confidence,
                    score,
                    format!("choppy mid-range with weak score {:.1}", score),
                ),
                Alignment::None,
            );
        }

        // 4. alignment
        let alignment = trend_alignment(input.scores, &cfg.alignment_deadzone);

        // 5. regime branch
        let candidate = match regime_kind {
            Some(RegimeKind::Choppy) => self.mean_reversion(input, primary),
            _ => self.threshold_branch(regime_kind, score, alignment),
        };
        if candidate.action == TradeAction::Hold {
            return with_context(hold(cfg.hold_confidence, score, candidate.reason), alignment);
        }

        // 6. secondary filters
        let mut reasons = vec![candidate.reason.clone()];
        let filtered =
            self.secondary_filters(input, primary, candidate.action, score, &mut reasons);
        let factor = match filtered {
            Ok(factor) => factor,
            Err(veto) => return with_context(hold(cfg.hold_confidence, score, veto), alignment),
        };

        // 7. banding
        let bands = &cfg.bands;
        let base = match candidate.base_confidence {
            Some(c) => c,
            None if alignment == Alignment::Strong && score.abs() >= bands.high_min_score => {
                bands.high
            }
            None if alignment.is_aligned()
                || score.abs() >= candidate.threshold + bands.medium_margin =>
            {
                bands.medium
            }
            None => {
                return with_context(
                    hold(
                        cfg.hold_confidence,
                        score,
                        format!("score {:.1} without alignment support", score),
                    ),
                    alignment,
                );
            }
        };
        let confidence = (base * factor).clamp(0.0, bands.max_confidence);

        let weak_rebound = input
            .traps
            .is_some_and(|t| t.is_set(TrapKind::WeakRebound));
        if candidate.action == TradeAction::Long
            && weak_rebound
            && confidence < cfg.filters.weak_rebound_min_confidence
        {
            return with_context(
                hold(
                    cfg.hold_confidence,
                    score,
                    format!("weak rebound, confidence {:.0} too low", confidence),
                ),
                alignment,
            );
        }

        // 8. trade parameters
        let plan = PlanInputs {
            action: candidate.action,
            entry: primary.readings.price,
            atr: primary.readings.atr,
            atr_pct: primary.volatility_pct,
            regime: regime_kind,
            quality: input.position.map(|p| p.quality),
            confidence,
        };
        let Some(params) = plan_trade(&plan, &cfg.sizing, &self.stop) else {
            return with_context(
                hold(cfg.hold_confidence, score, "position size below one share".to_string()),
                alignment,
            );
        };

        reasons.push(format!(
            "{:?} alignment, score {:.1}, confidence {:.0}",
            alignment, score, confidence
        ));

        info!(
            symbol = input.symbol,
            action = candidate.action.name(),
            confidence,
            score,
            "Decision"
        );

        TradeDecision {
            symbol: input.symbol.to_string(),
            action: candidate.action,
            confidence,
            weighted_score: score,
            alignment,
            params: Some(params),
            context,
            reasons,
            decided_at: input.now,
        }
    }

    fn thresholds(&self, regime: Option<RegimeKind>) -> ActionThresholds {
        let t = &self.config.thresholds;
        match regime {
            Some(RegimeKind::TrendingUp) => t.trending_up,
            Some(RegimeKind::TrendingDown) => t.trending_down,
            Some(RegimeKind::Choppy | RegimeKind::VolatileDirectionless) => t.choppy,
            _ => t.default,
        }
    }

    fn threshold_branch(
        &self,
        regime: Option<RegimeKind>,
        score: f64,
        alignment: Alignment,
    ) -> Candidate {
        let t = &self.config.thresholds;
        let mut th = self.thresholds(regime);
        if alignment.is_aligned() {
            th.long = (th.long - t.alignment_offset).max(t.floor);
            th.short = (th.short - t.alignment_offset).max(t.floor);
        }

        let regime_name = regime.map_or("no regime", |r| r.name());
        let (action, reason) = if score >= th.long {
            (
                TradeAction::Long,
                format!("score {:.1} >= long threshold {:.0} ({})", score, th.long, regime_name),
            )
        } else if score <= -th.short {
            (
                TradeAction::Short,
                format!("score {:.1} <= short threshold -{:.0} ({})", score, th.short, regime_name),
            )
        } else {
            (
                TradeAction::Hold,
                format!(
                    "score {:.1} inside thresholds +{:.0}/-{:.0} ({})",
                    score, th.long, th.short, regime_name
                ),
            )
        };

        Candidate {
            action,
            base_confidence: None,
            threshold: match action {
                TradeAction::Short => th.short,
                _ => th.long,
            },
            reason,
        }
    }

    /// Choppy markets: fade oscillator extremes near the range edges.
    fn mean_reversion(&self, input: &DecisionInputs<'_>, primary: &ScoreSet) -> Candidate {
        let mr = &self.config.mean_reversion;
        let rsi = input
            .scores
            .get(Horizon::Medium)
            .map_or(primary.readings.rsi, |s| s.readings.rsi);

        let hold = |reason: String| Candidate {
            action: TradeAction::Hold,
            base_confidence: None,
            threshold: 0.0,
            reason,
        };
        let Some(pos) = input.position.map(|p| p.pct) else {
            return hold("choppy regime without range position".to_string());
        };

        let (action, confidence) = if rsi < mr.strong_long_rsi && pos < mr.strong_long_position {
            let c =
                (mr.strong_base + (mr.strong_long_rsi - rsi) * mr.strong_slope).min(mr.strong_cap);
            (TradeAction::Long, c)
        } else if rsi < mr.long_rsi && pos < mr.long_position {
            (TradeAction::Long, mr.standard_confidence)
        } else if rsi > mr.strong_short_rsi && pos > mr.strong_short_position {
            let c =
                (mr.strong_base + (rsi - mr.strong_short_rsi) * mr.strong_slope).min(mr.strong_cap);
            (TradeAction::Short, c)
        } else if rsi > mr.short_rsi && pos > mr.short_position {
            (TradeAction::Short, mr.standard_confidence)
        } else {
            return hold(format!(
                "choppy: RSI {:.1} at range {:.0}% has no reversion edge",
                rsi, pos
            ));
        };

        Candidate {
            action,
            base_confidence: Some(confidence),
            threshold: 0.0,
            reason: format!("mean reversion: RSI {:.1} at range {:.0}%", rsi, pos),
        }
    }

    /// Vetoes return Err with the hold reason; otherwise a confidence factor.
    fn secondary_filters(
        &self,
        input: &DecisionInputs<'_>,
        primary: &ScoreSet,
        action: TradeAction,
        score: f64,
        reasons: &mut Vec<String>,
    ) -> Result<f64, String> {
        let f = &self.config.filters;
        let rvol = primary.readings.volume_ratio;
        let adx = primary.readings.adx;
        let mut factor = 1.0;

        if rvol < f.min_rvol {
            return Err(format!("relative volume {:.2} too thin", rvol));
        }
        if adx < f.low_adx && rvol < f.low_rvol {
            if score.abs() < f.low_activity_min_score {
                return Err(format!(
                    "low activity: ADX {:.1}, relative volume {:.2}",
                    adx, rvol
                ));
            }
            factor *= f.low_activity_factor;
            reasons.push("low activity".to_string());
        }
        if rvol > f.high_rvol {
            factor *= f.high_rvol_factor;
            reasons.push(format!("relative volume {:.2} confirms", rvol));
        }

        if let Some(traps) = input.traps {
            let is_long = action == TradeAction::Long;
            for kind in [TrapKind::BullTrapRisk, TrapKind::FomoTop] {
                if is_long && traps.is_set(kind) {
                    return Err(format!("{} blocks long", kind.name()));
                }
            }
            if !is_long && traps.is_set(TrapKind::PanicBottom) {
                return Err(format!("{} blocks short", TrapKind::PanicBottom.name()));
            }

            if is_long && traps.is_set(TrapKind::WeakRebound) {
                factor *= f.weak_rebound_factor;
                reasons.push("weak rebound".to_string());
            }
            if traps.is_set(TrapKind::VolumeDivergence) {
                factor *= f.volume_divergence_factor;
                reasons.push("volume divergence".to_string());
            }
            if is_long && traps.is_set(TrapKind::Accumulation) {
                factor *= f.accumulation_factor;
                reasons.push("accumulation".to_string());
            }
            if is_long && traps.is_set(TrapKind::PanicBottom) {
                factor *= f.panic_bottom_factor;
                reasons.push("panic bottom".to_string());
            }
        }

        if let Some(s) = input.scores.sentiment() {
            if s.abs() >= f.sentiment_divergence_min && s.signum() != action.sign() {
                factor *= f.sentiment_divergence_factor;
                reasons.push(format!("sentiment {:.0} disagrees", s));
            }
        }

        Ok(factor)
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DecisionConfig::default(), StopConfig::default())
    }
}

fn build_context(input: &DecisionInputs<'_>, primary: &ScoreSet) -> DecisionContext {
    DecisionContext {
        regime: input.regime.cloned(),
        position: input.position.cloned(),
        traps: input.traps.cloned(),
        sentiment: input.scores.sentiment(),
        rsi: Some(primary.readings.rsi),
        atr_pct: Some(primary.volatility_pct),
        volume_ratio: Some(primary.readings.volume_ratio),
    }
}
