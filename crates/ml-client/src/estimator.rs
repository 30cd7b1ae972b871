use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{MLError, MLResult};
use crate::PredictorFeatures;

/// Raw output of a statistical/ML estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEstimate {
    pub prob_up: f64,
    pub prob_down: f64,
    /// Out-of-sample quality of the model, 0..1
    pub validation_quality: f64,
}

impl ModelEstimate {
    pub fn validate(&self) -> MLResult<()> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if in_unit(self.prob_up) && in_unit(self.prob_down) && in_unit(self.validation_quality) {
            Ok(())
        } else {
            Err(MLError::InvalidResponse(format!(
                "probabilities out of range: up={} down={} quality={}",
                self.prob_up, self.prob_down, self.validation_quality
            )))
        }
    }
}

/// Pluggable probability estimator behind the model strategy.
#[async_trait]
pub trait ProbabilityEstimator: Send + Sync {
    async fn estimate(&self, features: &PredictorFeatures) -> MLResult<ModelEstimate>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Serialize)]
struct PredictRequest {
    features: HashMap<String, f64>,
}

/// Estimator served over HTTP.
#[derive(Clone)]
pub struct HttpEstimator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEstimator {
    pub fn new(base_url: String, timeout: Duration) -> MLResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check service health
    pub async fn health(&self) -> MLResult<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl ProbabilityEstimator for HttpEstimator {
    async fn estimate(&self, features: &PredictorFeatures) -> MLResult<ModelEstimate> {
        let request = PredictRequest {
            features: features.to_map(),
        };

        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { MLError::Timeout } else { e.into() })?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(MLError::ModelNotLoaded);
            }
            return Err(MLError::ServiceUnavailable(format!("Status: {}", status)));
        }

        let estimate = response.json::<ModelEstimate>().await?;
        estimate.validate()?;
        Ok(estimate)
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
