pub mod extraction;
pub mod ocr;
pub mod ensemble;
pub mod metrics;
pub mod processor;

pub use processor::{Diagnostics, HealthReportProcessor, ProcessingOutcome};

use thiserror::Error;

use crate::config::ConfigError;
use extraction::NormalizationError;
use ocr::EngineError;

/// Rejections raised before any decoding or OCR work.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("Input is empty")]
    Empty,

    #[error("Input is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("MIME type not accepted: {0}")]
    UnsupportedMime(String),

    #[error("Input could not be decoded: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("All OCR engines failed: {}", summarize(.failures))]
    AllEnginesFailed { failures: Vec<EngineError> },

    #[error("Normalization failed: {0}")]
    Normalization(NormalizationError),

    #[error("Processing exceeded {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid options: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the same call may succeed later. Bad input and bad options
    /// never do; engine outages and deadlines might.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllEnginesFailed { .. } | Self::Timeout { .. } | Self::Internal(_)
        )
    }
}

impl From<NormalizationError> for PipelineError {
    fn from(e: NormalizationError) -> Self {
        match e {
            NormalizationError::UnsupportedFormat(mime) => {
                Self::InvalidInput(InputError::UnsupportedMime(mime))
            }
            NormalizationError::CorruptInput(reason) => Self::InvalidInput(InputError::Corrupt(reason)),
            other => Self::Normalization(other),
        }
    }
}

fn summarize(failures: &[EngineError]) -> String {
    if failures.is_empty() {
        return "no engines registered".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
