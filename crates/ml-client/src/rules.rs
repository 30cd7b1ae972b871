//! Rule-based weighted-feature scoring.
//!
//! Each feature adds all, part or none of its weight to the bullish or
//! bearish tally from fixed bands. The net tally goes through a tanh squash
//! into a probability, and confidence is hard-capped below certainty.

use analysis_core::{Prediction, PredictionSource, PredictorConfig, SignalLabel};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::PredictorFeatures;

#[derive(Default)]
struct Tally {
    bullish: f64,
    bearish: f64,
    factors: BTreeMap<String, f64>,
}

impl Tally {
    fn bull(&mut self, name: &str, amount: f64) {
        if amount > 0.0 {
            self.bullish += amount;
            self.factors.insert(name.to_string(), amount);
        }
    }

    fn bear(&mut self, name: &str, amount: f64) {
        if amount > 0.0 {
            self.bearish += amount;
            self.factors.insert(name.to_string(), -amount);
        }
    }
}

pub struct RuleBasedPredictor {
    config: PredictorConfig,
}

impl RuleBasedPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn predict(&self, f: &PredictorFeatures, at: DateTime<Utc>) -> Prediction {
        let w = &self.config.weights;
        let mut t = Tally::default();

        if f.trend_score >= 40.0 {
            t.bull("trend_strong_bull", w.trend_score);
        } else if f.trend_score >= 20.0 {
            t.bull("trend_bull", w.trend_score * 0.5);
        } else if f.trend_score <= -40.0 {
            t.bear("trend_strong_bear", w.trend_score);
        } else if f.trend_score <= -20.0 {
            t.bear("trend_bear", w.trend_score * 0.5);
        }

        if f.rsi < 30.0 {
            t.bull("rsi_oversold", w.rsi);
        } else if f.rsi < 40.0 {
            t.bull("rsi_low", w.rsi * 0.5);
        } else if f.rsi > 70.0 {
            t.bear("rsi_overbought", w.rsi);
        } else if f.rsi > 60.0 {
            t.bear("rsi_high", w.rsi * 0.5);
        }

        if f.bb_position < 0.2 {
            t.bull("bb_low", w.bb_position);
        } else if f.bb_position > 0.8 {
            t.bear("bb_high", w.bb_position);
        }

        if f.ema_cross_strength > 0.5 {
            t.bull("ema_bull", w.ema_cross_strength);
        } else if f.ema_cross_strength < -0.5 {
            t.bear("ema_bear", w.ema_cross_strength);
        }

        if f.macd_histogram > 0.0 {
            t.bull("macd_bull", w.macd_histogram * 0.5);
        } else if f.macd_histogram < 0.0 {
            t.bear("macd_bear", w.macd_histogram * 0.5);
        }

        if f.stoch_k < 20.0 {
            t.bull("stoch_oversold", w.stoch_k);
        } else if f.stoch_k > 80.0 {
            t.bear("stoch_overbought", w.stoch_k);
        }

        if f.momentum_accel > 0.3 {
            t.bull("momentum_accelerating_up", w.momentum_accel);
        } else if f.momentum_accel < -0.3 {
            t.bear("momentum_accelerating_down", w.momentum_accel);
        }

        if f.price_roc > 1.0 {
            t.bull("price_rising", w.price_roc * 0.7);
        } else if f.price_roc < -1.0 {
            t.bear("price_falling", w.price_roc * 0.7);
        }

        // heavy volume confirms whichever way price is moving
        if f.volume_ratio > 1.5 {
            if f.price_roc > 0.0 {
                t.bull("volume_confirms_up", w.volume_ratio * 0.5);
            } else if f.price_roc < 0.0 {
                t.bear("volume_confirms_down", w.volume_ratio * 0.5);
            }
        }

        match f.trend_confirmation {
            3 => t.bull("timeframes_confirm_up", w.trend_confirmation),
            2 => t.bull("timeframes_lean_up", w.trend_confirmation * 0.5),
            -3 => t.bear("timeframes_confirm_down", w.trend_confirmation),
            -2 => t.bear("timeframes_lean_down", w.trend_confirmation * 0.5),
            _ => {}
        }

        if f.trend_sustain > 0.5 && t.bullish > t.bearish {
            t.bull("trend_sustainable_up", w.trend_sustain);
        } else if f.trend_sustain < -0.5 && t.bearish > t.bullish {
            t.bear("trend_sustainable_down", w.trend_sustain);
        }

        let net = t.bullish - t.bearish;
        let prob_up = (0.5 + 0.5 * (self.config.squash_gain * net).tanh()).clamp(0.0, 1.0);
        let confidence = self
            .config
            .rule_confidence_cap
            .min((t.bullish + t.bearish) / 0.5);

        Prediction {
            prob_up,
            prob_down: 1.0 - prob_up,
            confidence,
            label: SignalLabel::from_probability(prob_up),
            factors: t.factors,
            source: PredictionSource::RuleBased,
            predicted_at: at,
        }
    }
}

impl Default for RuleBasedPredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullish_features() -> PredictorFeatures {
        PredictorFeatures {
            trend_score: 60.0,
            ema_cross_strength: 1.2,
            macd_histogram: 0.4,
            rsi: 35.0,
            bb_position: 0.15,
            stoch_k: 15.0,
            volume_ratio: 2.0,
            trend_confirmation: 3,
            price_roc: 2.0,
            momentum_accel: 0.5,
            trend_sustain: 0.8,
        }
    }

    #[test]
    fn test_neutral_features_give_coin_flip() {
        let p = RuleBasedPredictor::default().predict(&PredictorFeatures::default(), Utc::now());
        assert_eq!(p.prob_up, 0.5);
        assert_eq!(p.confidence, 0.0);
        assert_eq!(p.label, SignalLabel::Neutral);
        assert!(p.factors.is_empty());
        assert_eq!(p.source, PredictionSource::RuleBased);
    }

    #[test]
    fn test_bullish_features() {
        let p = RuleBasedPredictor::default().predict(&bullish_features(), Utc::now());
        assert!(p.prob_up > 0.65);
        assert_eq!(p.label, SignalLabel::StrongBullish);
        assert!((p.prob_up + p.prob_down - 1.0).abs() < 1e-12);
        assert!(p.factors.values().all(|v| *v > 0.0));
        assert!(p.factors.contains_key("timeframes_confirm_up"));
        assert!(p.factors.contains_key("volume_confirms_up"));
    }

    #[test]
    fn test_confidence_is_capped() {
        let p = RuleBasedPredictor::default().predict(&bullish_features(), Utc::now());
        assert_eq!(p.confidence, 0.70);

        let mut config = PredictorConfig::default();
        config.rule_confidence_cap = 0.5;
        let p = RuleBasedPredictor::new(config).predict(&bullish_features(), Utc::now());
        assert_eq!(p.confidence, 0.5);
    }

    #[test]
    fn test_bearish_mirror() {
        let f = PredictorFeatures {
            trend_score: -25.0,
            rsi: 75.0,
            bb_position: 0.9,
            trend_confirmation: -2,
            ..PredictorFeatures::default()
        };
        let p = RuleBasedPredictor::default().predict(&f, Utc::now());
        assert!(p.prob_up < 0.5);
        // 0.075 + 0.12 + 0.08 + 0.05
        let expected_net: f64 = -(0.075 + 0.12 + 0.08 + 0.05);
        assert!((p.prob_up - (0.5 + 0.5 * (2.0 * expected_net).tanh())).abs() < 1e-12);
        assert_eq!(p.factors["trend_bear"], -0.075);
    }
}
