pub mod types;
pub mod engine;
pub mod tesseract;
pub mod vision;
pub mod mock;

pub use types::*;
pub use engine::OcrEngine;
pub use mock::MockEngine;
pub use tesseract::TesseractEngine;
pub use vision::VisionEngine;

use serde::Serialize;
use thiserror::Error;

/// Why an engine produced no result.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineFailure {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("failed: {0}")]
    Failed(String),
}

/// A single engine's failure. Recovered by the selector, never fatal alone.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("OCR engine '{engine}' {reason}")]
pub struct EngineError {
    pub engine: String,
    pub reason: EngineFailure,
}

impl EngineError {
    pub fn unavailable(engine: &str, detail: impl Into<String>) -> Self {
        Self {
            engine: engine.to_string(),
            reason: EngineFailure::Unavailable(detail.into()),
        }
    }

    pub fn timeout(engine: &str, timeout_ms: u64) -> Self {
        Self {
            engine: engine.to_string(),
            reason: EngineFailure::Timeout(timeout_ms),
        }
    }

    pub fn failed(engine: &str, detail: impl Into<String>) -> Self {
        Self {
            engine: engine.to_string(),
            reason: EngineFailure::Failed(detail.into()),
        }
    }
}

/// Small raster pages for engine tests.
#[cfg(test)]
pub(crate) fn test_pages(count: usize) -> Vec<crate::pipeline::extraction::NormalizedPage> {
    use crate::pipeline::extraction::fixtures::make_test_png;
    use crate::pipeline::extraction::{NormalizedPage, PreprocessFlags};

    (1..=count)
        .map(|page_number| NormalizedPage {
            page_number,
            png_bytes: make_test_png(120, 80),
            width: 120,
            height: 80,
            flags: PreprocessFlags::default(),
            skew_angle: None,
        })
        .collect()
}
