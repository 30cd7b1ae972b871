use serde::{Deserialize, Serialize};

use crate::{Horizon, PerHorizon};

/// Raw indicator readings behind a score set, consumed by later stages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorReadings {
    pub price: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    /// Position inside the Bollinger band, 0 = lower band, 1 = upper band
    pub bb_position: f64,
    /// (fast EMA - slow EMA) / price, in percent
    pub ema_cross_strength: f64,
    pub atr: f64,
    /// Latest completed volume over its rolling average (RVOL)
    pub volume_ratio: f64,
    /// Rate of change over the ROC window, in percent
    pub price_roc: f64,
    /// Change in ROC versus the previous window
    pub momentum_accel: f64,
    /// Fraction of recent closes on the trend side of the fast EMA (-1..1)
    pub trend_sustain: f64,
    /// Body / range of the last completed bar, signed by direction (-1..1)
    pub candle_strength: f64,
}

/// Scores for a single timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub horizon: Horizon,
    /// Moving-average alignment score, -100..100
    pub trend: f64,
    /// Banded momentum score, -100..100
    pub oscillator: f64,
    /// ATR as a percentage of price
    pub volatility_pct: f64,
    /// Flow-proxy sentiment, None when no external feed is available
    pub sentiment: Option<f64>,
    pub readings: IndicatorReadings,
}

/// Scorer output for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeframeScore {
    Ready(ScoreSet),
    InsufficientData { have: usize, need: usize },
}

impl TimeframeScore {
    pub fn ready(&self) -> Option<&ScoreSet> {
        match self {
            TimeframeScore::Ready(s) => Some(s),
            TimeframeScore::InsufficientData { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TimeframeScore::Ready(_))
    }
}

/// Scorer output for a whole snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotScores {
    pub symbol: String,
    pub timeframes: PerHorizon<TimeframeScore>,
}

impl SnapshotScores {
    pub fn get(&self, horizon: Horizon) -> Option<&ScoreSet> {
        self.timeframes.get(horizon).ready()
    }

    pub fn trend(&self, horizon: Horizon) -> Option<f64> {
        self.get(horizon).map(|s| s.trend)
    }

    pub fn oscillator(&self, horizon: Horizon) -> Option<f64> {
        self.get(horizon).map(|s| s.oscillator)
    }

    /// Mean sentiment over timeframes that carry one
    pub fn sentiment(&self) -> Option<f64> {
        let values: Vec<f64> = Horizon::ALL
            .iter()
            .filter_map(|h| self.get(*h).and_then(|s| s.sentiment))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    pub fn any_ready(&self) -> bool {
        self.timeframes.iter().any(|(_, s)| s.is_ready())
    }
}
