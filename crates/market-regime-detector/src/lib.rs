use analysis_core::{Bar, RegimeConfig, RegimeKind, RegimeState, ScoreSet, TrendDirection};
use serde::{Deserialize, Serialize};
use technical_analysis::sma;
use tracing::debug;

pub mod position;

pub use position::PricePositionAnalyzer;

/// Everything the regime decision table looks at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeInputs {
    /// Directional-strength indicator
    pub adx: f64,
    /// Price / moving-average agreement
    pub direction: TrendDirection,
    /// MACD confirms `direction`
    pub momentum_confirms: bool,
    /// ATR as a percentage of price
    pub atr_pct: f64,
}

/// Saturating additive trend-strength score, clamped to 0..100.
pub fn trend_strength_score(inputs: &RegimeInputs, config: &RegimeConfig) -> f64 {
    let mut score = 0.0;

    if inputs.adx > config.adx_trend {
        score += config.adx_strong_points;
    } else if inputs.adx > config.adx_choppy {
        score += config.adx_weak_points;
    }

    if inputs.direction != TrendDirection::None {
        score += config.ma_alignment_points;
        if inputs.momentum_confirms {
            score += config.momentum_points;
        }
    }

    f64::clamp(score, 0.0, 100.0)
}

fn trending(direction: TrendDirection) -> RegimeKind {
    match direction {
        TrendDirection::Down => RegimeKind::TrendingDown,
        _ => RegimeKind::TrendingUp,
    }
}

/// Regime decision table. Pure: identical inputs always give the identical state.
///
/// Rows are checked top to bottom so that volatility and range compression win
/// over a weak trend reading.
pub fn classify(inputs: &RegimeInputs, config: &RegimeConfig) -> RegimeState {
    let strength = trend_strength_score(inputs, config);
    let has_direction = inputs.direction != TrendDirection::None;

    let (kind, confidence) = if !inputs.adx.is_finite() || !inputs.atr_pct.is_finite() {
        (RegimeKind::Unknown, 0.0)
    } else if inputs.atr_pct > config.atr_high_pct {
        if inputs.adx >= config.adx_trend && !has_direction {
            (RegimeKind::VolatileDirectionless, 75.0)
        } else {
            (RegimeKind::Volatile, 80.0)
        }
    } else if strength >= config.strength_high && has_direction {
        (trending(inputs.direction), 85.0)
    } else if inputs.adx < config.adx_choppy {
        (RegimeKind::Choppy, 70.0)
    } else if strength >= config.strength_low && has_direction {
        (trending(inputs.direction), 60.0)
    } else if !has_direction {
        (RegimeKind::VolatileDirectionless, 65.0)
    } else {
        (RegimeKind::Choppy, 55.0)
    };

    let reasoning = format!(
        "{} (strength {:.0}, ADX {:.1}, ATR {:.2}%, direction {:?}{})",
        kind.name(),
        strength,
        inputs.adx,
        inputs.atr_pct,
        inputs.direction,
        if inputs.momentum_confirms { ", MACD confirms" } else { "" }
    );

    RegimeState {
        kind,
        trend_strength: strength,
        direction: inputs.direction,
        confidence,
        adx: inputs.adx,
        atr_pct: inputs.atr_pct,
        reasoning,
    }
}

/// Price above/below two simple moving averages in order.
pub fn trend_direction(
    bars: &[Bar],
    price: f64,
    fast: usize,
    slow: usize,
) -> Option<TrendDirection> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let sma_fast = *sma(&closes, fast).last()?;
    let sma_slow = *sma(&closes, slow).last()?;

    Some(if price > sma_fast && sma_fast > sma_slow {
        TrendDirection::Up
    } else if price < sma_fast && sma_fast < sma_slow {
        TrendDirection::Down
    } else {
        TrendDirection::None
    })
}

/// Market regime classifier over the primary timeframe's scores.
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Gather decision-table inputs; None when the history is too short.
    pub fn inputs(&self, bars: &[Bar], scores: &ScoreSet) -> Option<RegimeInputs> {
        let r = &scores.readings;
        let direction = trend_direction(bars, r.price, self.config.sma_fast, self.config.sma_slow)?;
        let momentum_confirms = match direction {
            TrendDirection::Up => r.macd > r.macd_signal && r.macd_signal > 0.0,
            TrendDirection::Down => r.macd < r.macd_signal && r.macd_signal < 0.0,
            TrendDirection::None => false,
        };

        Some(RegimeInputs {
            adx: r.adx,
            direction,
            momentum_confirms,
            atr_pct: scores.volatility_pct,
        })
    }

    pub fn detect(&self, bars: &[Bar], scores: Option<&ScoreSet>) -> RegimeState {
        let Some(scores) = scores else {
            return RegimeState::unknown("primary timeframe has insufficient data");
        };
        match self.inputs(bars, scores) {
            Some(inputs) => {
                let state = classify(&inputs, &self.config);
                debug!(
                    regime = state.kind.name(),
                    strength = state.trend_strength,
                    "Regime classified"
                );
                state
            }
            None => RegimeState::unknown(format!(
                "need {} bars for moving-average direction, have {}",
                self.config.sma_slow,
                bars.len()
            )),
        }
    }
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self::new(RegimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Horizon, IndicatorReadings};
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_bars(count: usize, trend: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 3, 45, 0).unwrap();
        (0..count)
            .map(|i| {
                let base_price = 100.0 + (i as f64 * trend);
                Bar {
                    timestamp: start + Duration::minutes(5 * i as i64),
                    open: base_price,
                    high: base_price + 1.0,
                    low: base_price - 1.0,
                    close: base_price,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn inputs(adx: f64, direction: TrendDirection, momentum: bool, atr_pct: f64) -> RegimeInputs {
        RegimeInputs {
            adx,
            direction,
            momentum_confirms: momentum,
            atr_pct,
        }
    }

    fn scores_for(bars: &[Bar], adx: f64, macd: f64, macd_signal: f64, atr_pct: f64) -> ScoreSet {
        ScoreSet {
            horizon: Horizon::Short,
            trend: 0.0,
            oscillator: 0.0,
            volatility_pct: atr_pct,
            sentiment: None,
            readings: IndicatorReadings {
                price: bars.last().unwrap().close,
                adx,
                macd,
                macd_signal,
                ..IndicatorReadings::default()
            },
        }
    }

    #[test]
    fn test_strength_is_saturating_sum() {
        let c = RegimeConfig::default();
        assert_eq!(trend_strength_score(&inputs(30.0, TrendDirection::Up, true, 1.0), &c), 100.0);
        assert_eq!(trend_strength_score(&inputs(22.0, TrendDirection::Up, false, 1.0), &c), 50.0);
        assert_eq!(trend_strength_score(&inputs(10.0, TrendDirection::None, true, 1.0), &c), 0.0);
        assert_eq!(trend_strength_score(&inputs(26.0, TrendDirection::None, false, 1.0), &c), 40.0);
    }

    #[test]
    fn test_decision_table() {
        let c = RegimeConfig::default();
        let kind = |i: RegimeInputs| classify(&i, &c).kind;

        assert_eq!(kind(inputs(30.0, TrendDirection::Up, true, 1.0)), RegimeKind::TrendingUp);
        assert_eq!(kind(inputs(30.0, TrendDirection::Down, true, 1.0)), RegimeKind::TrendingDown);
        assert_eq!(kind(inputs(15.0, TrendDirection::None, false, 1.0)), RegimeKind::Choppy);
        assert_eq!(kind(inputs(30.0, TrendDirection::Up, true, 3.0)), RegimeKind::Volatile);
        assert_eq!(
            kind(inputs(30.0, TrendDirection::None, false, 3.0)),
            RegimeKind::VolatileDirectionless
        );
        assert_eq!(
            kind(inputs(22.0, TrendDirection::None, false, 1.0)),
            RegimeKind::VolatileDirectionless
        );
    }

    #[test]
    fn test_low_adx_beats_weak_trend() {
        let c = RegimeConfig::default();
        // aligned MAs with MACD but ADX only 15: strength 60, below the high bar
        let state = classify(&inputs(15.0, TrendDirection::Up, true, 1.0), &c);
        assert_eq!(state.kind, RegimeKind::Choppy);
        assert_eq!(state.trend_strength, 60.0);

        // same picture with ADX 22 is a weak trend
        let state = classify(&inputs(22.0, TrendDirection::Up, false, 1.0), &c);
        assert_eq!(state.kind, RegimeKind::TrendingUp);
        assert_eq!(state.confidence, 60.0);
    }

    #[test]
    fn test_detect_from_bars() {
        let classifier = RegimeClassifier::default();
        let bars = create_test_bars(100, 0.5);
        let scores = scores_for(&bars, 35.0, 2.0, 1.5, 1.0);
        let state = classifier.detect(&bars, Some(&scores));
        assert_eq!(state.kind, RegimeKind::TrendingUp);
        assert_eq!(state.direction, TrendDirection::Up);
        assert_eq!(state.confidence, 85.0);

        let bars = create_test_bars(100, -0.5);
        let scores = scores_for(&bars, 35.0, -2.0, -1.5, 1.0);
        assert_eq!(classifier.detect(&bars, Some(&scores)).kind, RegimeKind::TrendingDown);
    }

    #[test]
    fn test_unknown_without_data() {
        let classifier = RegimeClassifier::default();
        assert_eq!(classifier.detect(&[], None).kind, RegimeKind::Unknown);

        let bars = create_test_bars(10, 0.0);
        let scores = scores_for(&bars, 35.0, 0.0, 0.0, 1.0);
        let state = classifier.detect(&bars, Some(&scores));
        assert_eq!(state.kind, RegimeKind::Unknown);
        assert_eq!(state.confidence, 0.0);
    }
}
