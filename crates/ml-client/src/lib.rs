pub mod error;
pub mod estimator;
pub mod features;
pub mod predictor;
pub mod rules;

pub use error::{MLError, MLResult};
pub use estimator::{HttpEstimator, ModelEstimate, ProbabilityEstimator};
pub use features::PredictorFeatures;
pub use predictor::Predictor;
pub use rules::RuleBasedPredictor;

use std::time::Duration;

/// Configuration for the model estimator service
#[derive(Debug, Clone)]
pub struct MLConfig {
    /// None disables the HTTP estimator entirely
    pub predictor_url: Option<String>,
    pub timeout: Duration,
}

impl MLConfig {
    pub fn from_env() -> MLResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MLResult<Self> {
        let timeout_ms = match lookup("ML_PREDICTOR_TIMEOUT_MS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map_err(|e| MLError::InvalidConfig(format!("ML_PREDICTOR_TIMEOUT_MS: {}", e)))?,
            None => 2000,
        };

        Ok(Self {
            predictor_url: lookup("ML_PREDICTOR_URL").filter(|u| !u.trim().is_empty()),
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Build the HTTP estimator when a URL is configured.
    pub fn estimator(&self) -> MLResult<Option<HttpEstimator>> {
        self.predictor_url
            .as_ref()
            .map(|url| HttpEstimator::new(url.clone(), self.timeout))
            .transpose()
    }
}

impl Default for MLConfig {
    fn default() -> Self {
        Self {
            predictor_url: None,
            timeout: Duration::from_millis(2000),
        }
    }
}
