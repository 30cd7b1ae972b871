//! Property tests for the regime decision table.

use analysis_core::{RegimeConfig, RegimeKind, TrendDirection};
use market_regime_detector::{classify, trend_strength_score, RegimeInputs};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = TrendDirection> {
    prop_oneof![
        Just(TrendDirection::Up),
        Just(TrendDirection::Down),
        Just(TrendDirection::None),
    ]
}

fn arb_inputs() -> impl Strategy<Value = RegimeInputs> {
    (0.0..80.0_f64, arb_direction(), any::<bool>(), 0.0..6.0_f64).prop_map(
        |(adx, direction, momentum_confirms, atr_pct)| RegimeInputs {
            adx,
            direction,
            momentum_confirms,
            atr_pct,
        },
    )
}

// ── Purity ───────────────────────────────────────────────────────────

proptest! {
    /// Identical inputs always classify identically.
    #[test]
    fn classification_is_pure(inputs in arb_inputs()) {
        let config = RegimeConfig::default();
        let first = classify(&inputs, &config);
        let second = classify(&inputs, &config);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn strength_stays_bounded(inputs in arb_inputs()) {
        let score = trend_strength_score(&inputs, &RegimeConfig::default());
        prop_assert!((0.0..=100.0).contains(&score));
    }
}

// ── Conservative tie-breaks ──────────────────────────────────────────

proptest! {
    /// High ATR% never reads as trending, whatever the other inputs say.
    #[test]
    fn high_volatility_is_never_trending(mut inputs in arb_inputs(), atr in 2.6..10.0_f64) {
        inputs.atr_pct = atr;
        let state = classify(&inputs, &RegimeConfig::default());
        prop_assert!(state.kind.is_volatile());
        prop_assert!(!state.kind.is_trending());
    }

    /// Without directional agreement there is no trending regime.
    #[test]
    fn trending_requires_direction(mut inputs in arb_inputs()) {
        inputs.direction = TrendDirection::None;
        let state = classify(&inputs, &RegimeConfig::default());
        prop_assert!(state.kind != RegimeKind::TrendingUp);
        prop_assert!(state.kind != RegimeKind::TrendingDown);
    }
}
