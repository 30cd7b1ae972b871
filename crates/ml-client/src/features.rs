use analysis_core::{Horizon, SnapshotScores};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Feature vector shared by the rule-based and model strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorFeatures {
    pub trend_score: f64,
    pub ema_cross_strength: f64,
    pub macd_histogram: f64,
    pub rsi: f64,
    /// 0 = lower Bollinger band, 1 = upper
    pub bb_position: f64,
    pub stoch_k: f64,
    pub volume_ratio: f64,
    /// Net count of horizons with a positive trend score, -3..3
    pub trend_confirmation: i32,
    pub price_roc: f64,
    pub momentum_accel: f64,
    pub trend_sustain: f64,
}

impl PredictorFeatures {
    /// Build from the primary horizon's readings. None when that horizon has no scores.
    pub fn from_scores(scores: &SnapshotScores, primary: Horizon) -> Option<Self> {
        let set = scores.get(primary)?;
        let r = &set.readings;

        let trend_confirmation = Horizon::ALL
            .iter()
            .filter_map(|h| scores.trend(*h))
            .map(|t| {
                if t > 0.0 {
                    1
                } else if t < 0.0 {
                    -1
                } else {
                    0
                }
            })
            .sum();

        Some(Self {
            trend_score: set.trend,
            ema_cross_strength: r.ema_cross_strength,
            macd_histogram: r.macd_histogram,
            rsi: r.rsi,
            bb_position: r.bb_position,
            stoch_k: r.stoch_k,
            volume_ratio: r.volume_ratio,
            trend_confirmation,
            price_roc: r.price_roc,
            momentum_accel: r.momentum_accel,
            trend_sustain: r.trend_sustain,
        })
    }

    /// Flat name -> value map for the model service
    pub fn to_map(&self) -> HashMap<String, f64> {
        [
            ("trend_score", self.trend_score),
            ("ema_cross_strength", self.ema_cross_strength),
            ("macd_histogram", self.macd_histogram),
            ("rsi", self.rsi),
            ("bb_position", self.bb_position),
            ("stoch_k", self.stoch_k),
            ("volume_ratio", self.volume_ratio),
            ("trend_confirmation", self.trend_confirmation as f64),
            ("price_roc", self.price_roc),
            ("momentum_accel", self.momentum_accel),
            ("trend_sustain", self.trend_sustain),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Default for PredictorFeatures {
    fn default() -> Self {
        Self {
            trend_score: 0.0,
            ema_cross_strength: 0.0,
            macd_histogram: 0.0,
            rsi: 50.0,
            bb_position: 0.5,
            stoch_k: 50.0,
            volume_ratio: 1.0,
            trend_confirmation: 0,
            price_roc: 0.0,
            momentum_accel: 0.0,
            trend_sustain: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{IndicatorReadings, PerHorizon, ScoreSet, TimeframeScore};

    fn ready(horizon: Horizon, trend: f64) -> TimeframeScore {
        TimeframeScore::Ready(ScoreSet {
            horizon,
            trend,
            oscillator: 0.0,
            volatility_pct: 1.0,
            sentiment: None,
            readings: IndicatorReadings {
                rsi: 42.0,
                bb_position: 0.3,
                ..IndicatorReadings::default()
            },
        })
    }

    #[test]
    fn test_features_from_primary_horizon() {
        let scores = SnapshotScores {
            symbol: "AAPL".to_string(),
            timeframes: PerHorizon::new(
                ready(Horizon::Short, 30.0),
                ready(Horizon::Medium, 60.0),
                TimeframeScore::InsufficientData { have: 20, need: 60 },
            ),
        };
        let f = PredictorFeatures::from_scores(&scores, Horizon::Short).unwrap();
        assert_eq!(f.trend_score, 30.0);
        assert_eq!(f.trend_confirmation, 2);
        assert_eq!(f.rsi, 42.0);
        assert_eq!(f.to_map()["trend_confirmation"], 2.0);
        assert_eq!(f.to_map().len(), 11);

        assert!(PredictorFeatures::from_scores(&scores, Horizon::Long).is_none());
    }
}
