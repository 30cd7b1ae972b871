use analysis_core::{
    Prediction, PredictionSource, PredictorConfig, PredictorStrategy, SignalLabel,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::estimator::{ModelEstimate, ProbabilityEstimator};
use crate::rules::RuleBasedPredictor;
use crate::PredictorFeatures;

/// Strategy-selecting predictor. The model strategy falls back to the rule
/// engine whenever the estimator is missing or fails.
pub struct Predictor {
    config: PredictorConfig,
    rules: RuleBasedPredictor,
    estimator: Option<Arc<dyn ProbabilityEstimator>>,
}

impl Predictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            rules: RuleBasedPredictor::new(config.clone()),
            config,
            estimator: None,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn ProbabilityEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn strategy(&self) -> PredictorStrategy {
        self.config.strategy
    }

    pub async fn predict(&self, features: &PredictorFeatures, at: DateTime<Utc>) -> Prediction {
        if self.config.strategy == PredictorStrategy::RuleBased {
            return self.rules.predict(features, at);
        }

        let Some(estimator) = &self.estimator else {
            warn!("Model strategy selected without an estimator, falling back to rules");
            return self.rules.predict(features, at);
        };

        match estimator.estimate(features).await {
            Ok(estimate) => {
                debug!(
                    backend = estimator.backend_name(),
                    prob_up = estimate.prob_up,
                    quality = estimate.validation_quality,
                    "Model prediction"
                );
                self.from_estimate(&estimate, at)
            }
            Err(e) => {
                warn!(
                    backend = estimator.backend_name(),
                    error = %e,
                    "Model estimator unavailable, falling back to rule-based prediction"
                );
                self.rules.predict(features, at)
            }
        }
    }

    fn from_estimate(&self, estimate: &ModelEstimate, at: DateTime<Utc>) -> Prediction {
        let edge = ((estimate.prob_up - 0.5).abs() * 2.0).min(self.config.model_confidence_cap);
        let mut factors = BTreeMap::new();
        factors.insert("model_edge".to_string(), estimate.prob_up - 0.5);
        factors.insert("validation_quality".to_string(), estimate.validation_quality);

        Prediction {
            prob_up: estimate.prob_up,
            prob_down: estimate.prob_down,
            confidence: edge * estimate.validation_quality,
            label: SignalLabel::from_probability(estimate.prob_up),
            factors,
            source: PredictionSource::Model,
            predicted_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MLError, MLResult};
    use async_trait::async_trait;

    struct FixedEstimator(ModelEstimate);

    #[async_trait]
    impl ProbabilityEstimator for FixedEstimator {
        async fn estimate(&self, _features: &PredictorFeatures) -> MLResult<ModelEstimate> {
            Ok(self.0.clone())
        }

        fn backend_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct DownEstimator;

    #[async_trait]
    impl ProbabilityEstimator for DownEstimator {
        async fn estimate(&self, _features: &PredictorFeatures) -> MLResult<ModelEstimate> {
            Err(MLError::ModelNotLoaded)
        }

        fn backend_name(&self) -> &'static str {
            "down"
        }
    }

    fn model_config() -> PredictorConfig {
        PredictorConfig {
            strategy: PredictorStrategy::Model,
            ..PredictorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_model_confidence_scaled_by_quality() {
        let predictor = Predictor::new(model_config()).with_estimator(Arc::new(FixedEstimator(
            ModelEstimate {
                prob_up: 0.75,
                prob_down: 0.2,
                validation_quality: 0.8,
            },
        )));
        let p = predictor.predict(&PredictorFeatures::default(), Utc::now()).await;
        assert_eq!(p.source, PredictionSource::Model);
        assert_eq!(p.prob_down, 0.2);
        assert!((p.confidence - 0.4).abs() < 1e-12);
        assert_eq!(p.label, SignalLabel::StrongBullish);
    }

    #[tokio::test]
    async fn test_model_confidence_capped() {
        let predictor = Predictor::new(model_config()).with_estimator(Arc::new(FixedEstimator(
            ModelEstimate {
                prob_up: 1.0,
                prob_down: 0.0,
                validation_quality: 1.0,
            },
        )));
        let p = predictor.predict(&PredictorFeatures::default(), Utc::now()).await;
        assert_eq!(p.confidence, 0.90);
    }

    #[tokio::test]
    async fn test_falls_back_when_estimator_fails() {
        let predictor = Predictor::new(model_config()).with_estimator(Arc::new(DownEstimator));
        let p = predictor.predict(&PredictorFeatures::default(), Utc::now()).await;
        assert_eq!(p.source, PredictionSource::RuleBased);
        assert_eq!(p.prob_up, 0.5);
    }

    #[tokio::test]
    async fn test_falls_back_without_estimator() {
        let p = Predictor::new(model_config())
            .predict(&PredictorFeatures::default(), Utc::now())
            .await;
        assert_eq!(p.source, PredictionSource::RuleBased);
    }

    #[test]
    fn test_rule_strategy_ignores_estimator() {
        let predictor = Predictor::new(PredictorConfig::default()).with_estimator(Arc::new(
            FixedEstimator(ModelEstimate {
                prob_up: 0.9,
                prob_down: 0.1,
                validation_quality: 1.0,
            }),
        ));
        let p = tokio_test::block_on(predictor.predict(&PredictorFeatures::default(), Utc::now()));
        assert_eq!(p.source, PredictionSource::RuleBased);
    }
}
