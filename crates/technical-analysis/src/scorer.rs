use analysis_core::{
    stats, Bar, CapabilityManifest, Horizon, IndicatorReadings, ScoreSet, ScorerConfig, Snapshot,
    SnapshotScores, TimeframeScore, TimeframeSeries,
};
use tracing::debug;

use crate::indicators::*;

/// Turns a snapshot into per-timeframe trend / oscillator / volatility / sentiment scores.
pub struct IndicatorScorer {
    config: ScorerConfig,
}

/// Moving-average alignment score.
///
/// Counts how many of (price > fast, fast > slow, price > slow) point each way:
/// all three give the full score, two give the partial score, anything else 0.
pub fn trend_score(price: f64, ema_fast: f64, ema_slow: f64, config: &ScorerConfig) -> f64 {
    let bullish = [price > ema_fast, ema_fast > ema_slow, price > ema_slow]
        .iter()
        .filter(|c| **c)
        .count();
    let bearish = [price < ema_fast, ema_fast < ema_slow, price < ema_slow]
        .iter()
        .filter(|c| **c)
        .count();

    match (bullish, bearish) {
        (3, _) => config.trend_full_score,
        (_, 3) => -config.trend_full_score,
        (2, b) if b < 2 => config.trend_partial_score,
        (b, 2) if b < 2 => -config.trend_partial_score,
        _ => 0.0,
    }
}

/// Fixed-band momentum score: oversold adds, overbought subtracts.
pub fn oscillator_score(rsi: f64, stoch_k: f64, config: &ScorerConfig) -> f64 {
    let rsi_part = if rsi <= config.rsi_extreme_oversold {
        config.rsi_extreme_points
    } else if rsi < config.rsi_oversold {
        config.rsi_points
    } else if rsi >= config.rsi_extreme_overbought {
        -config.rsi_extreme_points
    } else if rsi > config.rsi_overbought {
        -config.rsi_points
    } else {
        0.0
    };

    let stoch_part = if stoch_k <= config.stoch_extreme_oversold {
        config.stoch_extreme_points
    } else if stoch_k < config.stoch_oversold {
        config.stoch_points
    } else if stoch_k >= config.stoch_extreme_overbought {
        -config.stoch_extreme_points
    } else if stoch_k > config.stoch_overbought {
        -config.stoch_points
    } else {
        0.0
    };

    (rsi_part + stoch_part).clamp(-100.0, 100.0)
}

/// Net flow over gross flow for the last `lookback` values, scaled to -100..100.
pub fn sentiment_score(flow: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || flow.len() < lookback {
        return None;
    }
    let recent = stats::tail(flow, lookback);
    if recent.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let net: f64 = recent.iter().sum();
    let gross: f64 = recent.iter().map(|v| v.abs()).sum();
    if gross == 0.0 {
        return Some(0.0);
    }
    Some((net / gross * 100.0).clamp(-100.0, 100.0))
}

fn last(values: &[f64]) -> Option<f64> {
    values.last().copied()
}

impl IndicatorScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn score_snapshot(
        &self,
        snapshot: &Snapshot,
        manifest: &CapabilityManifest,
    ) -> SnapshotScores {
        let timeframes = snapshot
            .series
            .map(|horizon, series| self.score_series(horizon, series, manifest.sentiment));

        for (horizon, score) in timeframes.iter() {
            if let TimeframeScore::InsufficientData { have, need } = score {
                debug!(
                    symbol = %snapshot.symbol,
                    timeframe = %horizon,
                    have,
                    need,
                    "Timeframe excluded: insufficient history"
                );
            }
        }

        SnapshotScores {
            symbol: snapshot.symbol.clone(),
            timeframes,
        }
    }

    /// Score one timeframe. Indicators use completed bars only; the forming
    /// bar supplies the latest price.
    pub fn score_series(
        &self,
        horizon: Horizon,
        series: &TimeframeSeries,
        include_sentiment: bool,
    ) -> TimeframeScore {
        let need = self.config.longest_lookback();
        let bars = series.completed();
        let insufficient = TimeframeScore::InsufficientData {
            have: bars.len(),
            need,
        };
        if bars.len() < need {
            return insufficient;
        }

        let price = match series.latest_price() {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => return insufficient,
        };

        let readings = match self.readings(bars, price) {
            Some(r) => r,
            None => return insufficient,
        };

        let sentiment = if include_sentiment {
            series
                .flow()
                .and_then(|f| sentiment_score(f, self.config.sentiment_lookback))
        } else {
            None
        };

        TimeframeScore::Ready(ScoreSet {
            horizon,
            trend: trend_score(price, readings.ema_fast, readings.ema_slow, &self.config),
            oscillator: oscillator_score(readings.rsi, readings.stoch_k, &self.config),
            volatility_pct: readings.atr / price * 100.0,
            sentiment,
            readings,
        })
    }

    fn readings(&self, bars: &[Bar], price: f64) -> Option<IndicatorReadings> {
        let c = &self.config;
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

        let fast = ema(&closes, c.ema_fast);
        let ema_fast = last(&fast)?;
        let ema_slow = last(&ema(&closes, c.ema_slow))?;
        let rsi_value = last(&rsi(&closes, c.rsi_period))?;

        let stoch = stochastic(bars, c.stoch_period, c.stoch_smooth);
        let stoch_k = last(&stoch.k)?;
        let stoch_d = last(&stoch.d).unwrap_or(stoch_k);

        let dmi = adx(bars, c.adx_period);
        let macd_result = macd(&closes, c.macd_fast, c.macd_slow, c.macd_signal);
        let bands = bollinger_bands(&closes, c.bb_period, c.bb_std_dev);
        let atr_value = last(&atr(bars, c.atr_period))?;

        let roc = rate_of_change(&closes, c.roc_period);
        let price_roc = last(&roc)?;
        let momentum_accel = roc
            .len()
            .checked_sub(c.roc_period + 1)
            .map(|i| price_roc - roc[i])
            .unwrap_or(0.0);

        Some(IndicatorReadings {
            price,
            ema_fast,
            ema_slow,
            rsi: rsi_value,
            stoch_k,
            stoch_d,
            adx: last(&dmi.adx)?,
            plus_di: last(&dmi.plus_di)?,
            minus_di: last(&dmi.minus_di)?,
            macd: last(&macd_result.macd_line)?,
            macd_signal: last(&macd_result.signal_line)?,
            macd_histogram: last(&macd_result.histogram)?,
            bb_position: bands.position(price)?,
            ema_cross_strength: (ema_fast - ema_slow) / price * 100.0,
            atr: atr_value,
            volume_ratio: relative_volume(bars, c.volume_window).unwrap_or(1.0),
            price_roc,
            momentum_accel,
            trend_sustain: trend_sustain(&closes, &fast, c.ema_fast, 10),
            candle_strength: bars.last().map(candle_strength).unwrap_or(0.0),
        })
    }
}

/// Share of the last `window` closes above (+) or below (-) the fast EMA.
fn trend_sustain(closes: &[f64], fast: &[f64], period: usize, window: usize) -> f64 {
    let n = window.min(fast.len());
    if n == 0 {
        return 0.0;
    }
    let net: i32 = (closes.len() - n..closes.len())
        .map(|i| {
            let ema_at = fast[i + 1 - period];
            if closes[i] > ema_at {
                1
            } else if closes[i] < ema_at {
                -1
            } else {
                0
            }
        })
        .sum();
    net as f64 / n as f64
}

fn candle_strength(bar: &Bar) -> f64 {
    let range = bar.high - bar.low;
    if range <= 0.0 {
        return 0.0;
    }
    (bar.close - bar.open) / range
}

impl Default for IndicatorScorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{PerHorizon, Timeframe};
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_bars(count: usize, start_price: f64, step: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 2, 5, 3, 45, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = start_price + step * i as f64 + (i as f64 * 0.7).sin() * 0.3;
                Bar {
                    timestamp: start + Duration::minutes(5 * i as i64),
                    open: close - step * 0.5,
                    high: close + 0.6,
                    low: close - 0.6,
                    close,
                    volume: 10_000.0 + (i % 5) as f64 * 500.0,
                }
            })
            .collect()
    }

    fn series(bars: Vec<Bar>) -> TimeframeSeries {
        TimeframeSeries::new(Timeframe::Minute5, bars, None)
    }

    #[test]
    fn test_trend_score_alignment_bands() {
        let c = ScorerConfig::default();
        assert_eq!(trend_score(105.0, 103.0, 100.0, &c), 60.0);
        assert_eq!(trend_score(95.0, 97.0, 100.0, &c), -60.0);
        // pullback inside an uptrend
        assert_eq!(trend_score(102.0, 103.0, 100.0, &c), 30.0);
        // bounce inside a downtrend
        assert_eq!(trend_score(98.0, 97.0, 100.0, &c), -30.0);
        assert_eq!(trend_score(100.0, 100.0, 100.0, &c), 0.0);
    }

    #[test]
    fn test_oscillator_uses_fixed_bands() {
        let c = ScorerConfig::default();
        assert_eq!(oscillator_score(50.0, 50.0, &c), 0.0);
        assert_eq!(oscillator_score(25.0, 50.0, &c), 25.0);
        assert_eq!(oscillator_score(29.9, 50.0, &c), 25.0);
        assert_eq!(oscillator_score(15.0, 5.0, &c), 70.0);
        assert_eq!(oscillator_score(75.0, 85.0, &c), -45.0);
        assert_eq!(oscillator_score(85.0, 95.0, &c), -70.0);
    }

    #[test]
    fn test_sentiment_from_flow_proxy() {
        assert_eq!(sentiment_score(&[1.0, 2.0], 12), None);
        assert_eq!(sentiment_score(&[0.0; 12], 12), Some(0.0));
        let flow = [3.0, -1.0, 2.0, 2.0];
        assert_eq!(sentiment_score(&flow, 4), Some(75.0));
        assert_eq!(sentiment_score(&[5.0, -5.0, -5.0], 2), Some(-100.0));
    }

    #[test]
    fn test_insufficient_history_is_marked_not_zeroed() {
        let scorer = IndicatorScorer::default();
        let score = scorer.score_series(
            Horizon::Long,
            &series(create_test_bars(59, 100.0, 0.2)),
            true,
        );
        assert_eq!(score, TimeframeScore::InsufficientData { have: 59, need: 60 });
        assert!(score.ready().is_none());
    }

    #[test]
    fn test_uptrend_scores_positive() {
        let scorer = IndicatorScorer::default();
        let score = scorer.score_series(
            Horizon::Short,
            &series(create_test_bars(120, 100.0, 0.25)),
            true,
        );
        let set = score.ready().expect("enough history");
        assert_eq!(set.trend, 60.0);
        assert!(set.volatility_pct > 0.0);
        assert!(set.readings.ema_fast > set.readings.ema_slow);
        assert!(set.readings.adx > 0.0);
        assert_eq!(set.sentiment, None);
    }

    #[test]
    fn test_downtrend_scores_negative() {
        let scorer = IndicatorScorer::default();
        let score = scorer.score_series(
            Horizon::Medium,
            &series(create_test_bars(120, 200.0, -0.25)),
            true,
        );
        assert_eq!(score.ready().unwrap().trend, -60.0);
    }

    #[test]
    fn test_in_progress_bar_only_moves_price() {
        let scorer = IndicatorScorer::default();
        let bars = create_test_bars(120, 100.0, 0.25);
        let last_close = bars.last().unwrap().close;
        let mut forming = bars.last().unwrap().clone();
        forming.timestamp = forming.timestamp + Duration::minutes(5);
        forming.close = last_close * 0.5;

        let closed = scorer.score_series(Horizon::Short, &series(bars.clone()), false);
        let with_forming = scorer.score_series(
            Horizon::Short,
            &TimeframeSeries::new(Timeframe::Minute5, bars, Some(forming)),
            false,
        );
        let a = closed.ready().unwrap();
        let b = with_forming.ready().unwrap();
        assert_eq!(a.readings.ema_slow, b.readings.ema_slow);
        assert_eq!(a.readings.rsi, b.readings.rsi);
        assert_eq!(b.readings.price, last_close * 0.5);
        // price under both averages while fast stays above slow
        assert_eq!(a.trend, 60.0);
        assert_eq!(b.trend, -30.0);
    }

    #[test]
    fn test_sentiment_respects_manifest() {
        let scorer = IndicatorScorer::default();
        let bars = create_test_bars(120, 100.0, 0.25);
        let flow: Vec<f64> = (0..bars.len()).map(|i| if i % 4 == 0 { -1.0 } else { 1.0 }).collect();
        let s = series(bars).with_flow(flow);

        let snapshot = Snapshot {
            symbol: "SBIN".into(),
            series: PerHorizon::new(s.clone(), s.clone(), s),
            built_at: Utc::now(),
        };
        let on = scorer.score_snapshot(&snapshot, &CapabilityManifest::default());
        assert_eq!(on.get(Horizon::Short).unwrap().sentiment, Some(50.0));

        let manifest = CapabilityManifest {
            sentiment: false,
            ..CapabilityManifest::default()
        };
        let off = scorer.score_snapshot(&snapshot, &manifest);
        assert_eq!(off.sentiment(), None);
    }
}
