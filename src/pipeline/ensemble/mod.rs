pub mod similarity;
pub mod combiner;
pub mod selector;

pub use combiner::{combine, Combination, EnsembleSettings};
pub use selector::{EngineOutcome, EngineSelector, SelectionConfig};

use serde::Serialize;

use crate::pipeline::ocr::EngineError;

/// `processing_method` when several engines were combined.
pub const METHOD_ENSEMBLE: &str = "ensemble";
/// `processing_method` when every page came from the PDF text layer.
pub const METHOD_PDF_TEXT: &str = "pdf-text";

/// Which engines produced a result and what went wrong on the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Engines whose output was considered, in ranking order.
    pub engines: Vec<String>,
    /// Engines in the winning agreement cluster (ensemble only).
    pub agreeing_engines: Vec<String>,
    /// Preferred engine that was replaced by the default engine.
    pub fallback_from: Option<String>,
    /// Every engine failure, sorted by engine name.
    pub failures: Vec<EngineError>,
}

/// Outcome of the OCR stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    /// Text per raster page, in page order.
    #[serde(skip)]
    pub page_texts: Vec<String>,
    /// 0–100.
    pub confidence: f64,
    pub page_count: usize,
    /// Engine name, "ensemble", or "pdf-text".
    pub processing_method: String,
    pub processing_time_ms: u64,
    pub provenance: Provenance,
}
