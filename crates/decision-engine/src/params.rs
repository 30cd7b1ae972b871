use analysis_core::{
    PositionQuality, PositionSide, RegimeKind, SizingConfig, StopConfig, TradeAction, TradeParams,
};

/// What the sizing rules look at for one directional decision.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs {
    pub action: TradeAction,
    pub entry: f64,
    pub atr: f64,
    pub atr_pct: f64,
    pub regime: Option<RegimeKind>,
    pub quality: Option<PositionQuality>,
    /// Final decision confidence, 0..100
    pub confidence: f64,
}

fn reward_multiple(regime: Option<RegimeKind>, confidence: f64, s: &SizingConfig) -> f64 {
    let base = match regime {
        Some(RegimeKind::TrendingUp | RegimeKind::TrendingDown) => s.reward_trending,
        Some(RegimeKind::Volatile | RegimeKind::VolatileDirectionless) => s.reward_volatile,
        Some(RegimeKind::Choppy) => s.reward_choppy,
        _ => s.reward_default,
    };
    if confidence >= s.high_confidence {
        base * s.high_confidence_reward_boost
    } else {
        base
    }
}

fn size_factor(inputs: &PlanInputs, s: &SizingConfig) -> f64 {
    let regime = match inputs.regime {
        Some(RegimeKind::TrendingUp | RegimeKind::TrendingDown) => s.size_trending,
        Some(RegimeKind::Volatile | RegimeKind::VolatileDirectionless) => s.size_volatile,
        Some(RegimeKind::Choppy) => s.size_choppy,
        _ => 1.0,
    };
    let quality = match inputs.quality {
        Some(PositionQuality::Excellent) => s.size_excellent,
        Some(PositionQuality::Poor) => s.size_poor,
        Some(PositionQuality::Terrible) => s.size_terrible,
        _ => 1.0,
    };
    let confidence = if inputs.confidence > s.confidence_scale_above {
        (inputs.confidence / s.confidence_scale_above).min(s.max_confidence_scale)
    } else if inputs.confidence < s.low_confidence {
        s.low_confidence_scale
    } else {
        1.0
    };
    regime * quality * confidence
}

/// Stop, target and size for a directional decision.
///
/// None for hold, for a non-positive entry, or when the sized notional buys
/// less than one share.
pub fn plan_trade(
    inputs: &PlanInputs,
    sizing: &SizingConfig,
    stop: &StopConfig,
) -> Option<TradeParams> {
    let side = match inputs.action {
        TradeAction::Long => PositionSide::Long,
        TradeAction::Short => PositionSide::Short,
        TradeAction::Hold => return None,
    };
    if !(inputs.entry.is_finite() && inputs.entry > 0.0) {
        return None;
    }

    let entry = inputs.entry;
    let stop_loss = stop.stop_price(entry, inputs.atr_pct, side);
    let risk = (entry - stop_loss).abs();
    let reward = risk * reward_multiple(inputs.regime, inputs.confidence, sizing);
    let take_profit = match side {
        PositionSide::Long => entry + reward,
        PositionSide::Short => entry - reward,
    };

    let target_notional = sizing.base_position_value * size_factor(inputs, sizing);
    let quantity = (target_notional / entry).floor();
    if quantity < 1.0 {
        return None;
    }

    Some(TradeParams {
        entry_price: entry,
        stop_loss,
        take_profit,
        quantity,
        notional: quantity * entry,
        leverage: sizing.leverage,
        atr: inputs.atr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(action: TradeAction, regime: RegimeKind, confidence: f64) -> PlanInputs {
        PlanInputs {
            action,
            entry: 100.0,
            atr: 1.0,
            atr_pct: 1.0,
            regime: Some(regime),
            quality: Some(PositionQuality::Good),
            confidence,
        }
    }

    #[test]
    fn test_long_trending_high_confidence() {
        let p = plan_trade(
            &inputs(TradeAction::Long, RegimeKind::TrendingUp, 85.0),
            &SizingConfig::default(),
            &StopConfig::default(),
        )
        .unwrap();
        assert!((p.stop_loss - 98.5).abs() < 1e-9);
        // 1.5 risk * 3.0 * 1.1
        assert!((p.take_profit - 104.95).abs() < 1e-9);
        // 10_000 * 1.2 * 1.0 * (85 / 70)
        assert_eq!(p.quantity, 145.0);
        assert!((p.reward_risk(PositionSide::Long).unwrap() - 3.3).abs() < 1e-9);
    }

    #[test]
    fn test_short_mirrors_long() {
        let mut short = inputs(TradeAction::Short, RegimeKind::Choppy, 60.0);
        short.entry = 99.0;
        let p = plan_trade(&short, &SizingConfig::default(), &StopConfig::default()).unwrap();
        assert!(p.stop_loss > p.entry_price);
        assert!(p.take_profit < p.entry_price);
        assert!((p.reward_risk(PositionSide::Short).unwrap() - 1.6).abs() < 1e-9);
        assert_eq!(p.quantity, 70.0);
    }

    #[test]
    fn test_size_scaling() {
        let sizing = SizingConfig::default();
        let stop = StopConfig::default();

        let mut low = inputs(TradeAction::Long, RegimeKind::Volatile, 40.0);
        low.quality = Some(PositionQuality::Terrible);
        // 10_000 * 0.5 * 0.3 * 0.7
        assert_eq!(plan_trade(&low, &sizing, &stop).unwrap().quantity, 10.0);

        let mut capped = inputs(TradeAction::Long, RegimeKind::TrendingUp, 200.0);
        capped.quality = Some(PositionQuality::Excellent);
        capped.entry = 99.0;
        // confidence factor caps at 1.5: 23_400 / 99
        assert_eq!(plan_trade(&capped, &sizing, &stop).unwrap().quantity, 236.0);
    }

    #[test]
    fn test_no_plan_for_hold_or_tiny_size() {
        let sizing = SizingConfig::default();
        let stop = StopConfig::default();
        let hold = inputs(TradeAction::Hold, RegimeKind::TrendingUp, 85.0);
        assert!(plan_trade(&hold, &sizing, &stop).is_none());

        let mut pricey = inputs(TradeAction::Long, RegimeKind::TrendingUp, 85.0);
        pricey.entry = 50_000.0;
        assert!(plan_trade(&pricey, &sizing, &stop).is_none());
    }
}
