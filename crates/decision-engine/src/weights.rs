use analysis_core::{Horizon, PerHorizon, Prediction, SignalWeights, SnapshotScores};
use serde::{Deserialize, Serialize};

/// Signals entering the weighted vote. `None` means unavailable this cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VoteInputs {
    pub trend: PerHorizon<Option<f64>>,
    pub oscillator: PerHorizon<Option<f64>>,
    /// Prediction mapped onto -100..100
    pub predictor: Option<f64>,
    pub sentiment: Option<f64>,
}

impl VoteInputs {
    pub fn from_scores(scores: &SnapshotScores, prediction: Option<&Prediction>) -> Self {
        Self {
            trend: PerHorizon::new(
                scores.trend(Horizon::Short),
                scores.trend(Horizon::Medium),
                scores.trend(Horizon::Long),
            ),
            oscillator: PerHorizon::new(
                scores.oscillator(Horizon::Short),
                scores.oscillator(Horizon::Medium),
                scores.oscillator(Horizon::Long),
            ),
            predictor: prediction.map(|p| p.score()),
            sentiment: scores.sentiment(),
        }
    }

    pub fn has_trend(&self) -> bool {
        self.trend.iter().any(|(_, t)| t.is_some())
    }
}

/// Fixed-weight vote over the available signals, clamped to -100..100.
///
/// Missing signals contribute nothing and their weight is not handed to the
/// others. When sentiment is present the technical weights shrink by the
/// sentiment weight.
pub fn weighted_score(inputs: &VoteInputs, weights: &SignalWeights) -> f64 {
    let technical_scale = match inputs.sentiment {
        Some(_) => 1.0 - weights.sentiment,
        None => 1.0,
    };

    let mut total = 0.0;
    for h in Horizon::ALL {
        if let Some(t) = inputs.trend.get(h) {
            total += t * weights.trend.get(h) * technical_scale;
        }
        if let Some(o) = inputs.oscillator.get(h) {
            total += o * weights.oscillator.get(h) * technical_scale;
        }
    }
    if let Some(p) = inputs.predictor {
        total += p * weights.predictor * technical_scale;
    }
    if let Some(s) = inputs.sentiment {
        total += s * weights.sentiment;
    }

    total.clamp(-100.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trends(short: f64, medium: f64, long: f64) -> VoteInputs {
        VoteInputs {
            trend: PerHorizon::new(Some(short), Some(medium), Some(long)),
            oscillator: PerHorizon::new(Some(0.0), Some(0.0), Some(0.0)),
            predictor: None,
            sentiment: None,
        }
    }

    #[test]
    fn test_reference_weights() {
        let score = weighted_score(&trends(10.0, 30.0, 60.0), &SignalWeights::default());
        assert!((score - 21.9).abs() < 1e-9);
    }

    #[test]
    fn test_missing_signals_are_not_renormalized() {
        let weights = SignalWeights::default();
        let mut inputs = trends(10.0, 30.0, 60.0);
        inputs.trend.long = None;
        // only 0.3 + 3.6 remain
        assert!((weighted_score(&inputs, &weights) - 3.9).abs() < 1e-9);
    }

    #[test]
    fn test_sentiment_scales_technical_weights() {
        let weights = SignalWeights::default();
        let mut inputs = trends(10.0, 30.0, 60.0);
        inputs.sentiment = Some(40.0);
        let expected = 21.9 * 0.75 + 40.0 * 0.25;
        assert!((weighted_score(&inputs, &weights) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_predictor_contribution() {
        let weights = SignalWeights::default();
        let mut inputs = VoteInputs::default();
        inputs.predictor = Some(50.0);
        assert!((weighted_score(&inputs, &weights) - 2.5).abs() < 1e-9);
        assert!(!inputs.has_trend());
    }
}
