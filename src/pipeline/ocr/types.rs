use serde::Serialize;

/// Per-call recognition settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizeOptions {
    /// Tesseract-style language code(s), e.g. "eng" or "eng+fra". `None`
    /// keeps the engine's own setting.
    pub language: Option<String>,
}

/// Output of one engine over all raster pages of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub engine_name: String,
    pub text: String,
    /// One entry per input page, in input order.
    pub page_texts: Vec<String>,
    /// Mean token confidence, 0–100.
    pub confidence: f64,
    pub page_count: usize,
    pub token_count: usize,
    pub elapsed_ms: u64,
}

/// What an adapter recognized before timing and aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub page_texts: Vec<String>,
    /// Confidence of every recognized token across all pages, 0–100.
    pub token_confidences: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum EngineHealth {
    Healthy,
    Unhealthy(String),
}

impl EngineHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Separator placed between page texts in a combined document text.
pub const PAGE_SEPARATOR: &str = "\n\n";
