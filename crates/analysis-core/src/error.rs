use crate::Horizon;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data on {timeframe} timeframe: have {have} bars, need {need}")]
    InsufficientData {
        timeframe: Horizon,
        have: usize,
        need: usize,
    },

    #[error("Misaligned timeframes: {0}")]
    MisalignedTimeframes(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
}

impl AnalysisError {
    /// Data-quality problems degrade the affected symbol to hold.
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            AnalysisError::InsufficientData { .. }
                | AnalysisError::MisalignedTimeframes(_)
                | AnalysisError::InvalidData(_)
        )
    }

    /// Only configuration errors halt a whole cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnalysisError::Configuration(_))
    }

    /// Short machine-readable tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InsufficientData { .. } => "insufficient_data",
            AnalysisError::MisalignedTimeframes(_) => "misaligned_timeframes",
            AnalysisError::InvalidData(_) => "invalid_data",
            AnalysisError::Configuration(_) => "configuration",
            AnalysisError::ModelUnavailable(_) => "model_unavailable",
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
