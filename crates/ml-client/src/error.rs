use analysis_core::AnalysisError;
use thiserror::Error;

/// Failures talking to the probability model service.
#[derive(Error, Debug)]
pub enum MLError {
    #[error("model request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("invalid model estimate: {0}")]
    InvalidResponse(String),

    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("model request timed out")]
    Timeout,

    #[error("invalid ML client setting: {0}")]
    InvalidConfig(String),
}

pub type MLResult<T> = Result<T, MLError>;

/// Every model failure surfaces as ModelUnavailable so the predictor can
/// fall back to rules.
impl From<MLError> for AnalysisError {
    fn from(err: MLError) -> Self {
        AnalysisError::ModelUnavailable(err.to_string())
    }
}
