//! The closed set of OCR engines and their shared capability surface.

use std::time::Instant;

use tracing::Instrument;

use super::mock::MockEngine;
use super::tesseract::TesseractEngine;
use super::types::{EngineHealth, EngineResult, Recognition, RecognizeOptions, PAGE_SEPARATOR};
use super::vision::VisionEngine;
use super::EngineError;
use crate::pipeline::extraction::confidence::mean_token_confidence;
use crate::pipeline::extraction::NormalizedPage;

/// Every engine the pipeline can drive.
pub enum OcrEngine {
    /// Fast line recognizer, run as a `tesseract` subprocess.
    Tesseract(TesseractEngine),
    /// Neural recognizer served by a local Ollama vision model.
    Vision(VisionEngine),
    /// Deterministic in-process engine for tests and dry runs.
    Mock(MockEngine),
}

impl OcrEngine {
    pub fn name(&self) -> &str {
        match self {
            Self::Tesseract(_) => TesseractEngine::NAME,
            Self::Vision(_) => VisionEngine::NAME,
            Self::Mock(m) => m.name(),
        }
    }

    /// Whether the engine can serve a call made with `options`.
    pub async fn healthcheck(&self, options: &RecognizeOptions) -> EngineHealth {
        match self {
            Self::Tesseract(e) => e.healthcheck(options).await,
            Self::Vision(e) => e.healthcheck().await,
            Self::Mock(e) => e.healthcheck(),
        }
    }

    /// Recognize all pages. Zero tokens yields confidence 0, not an error.
    pub async fn recognize(
        &self,
        pages: &[NormalizedPage],
        options: &RecognizeOptions,
    ) -> Result<EngineResult, EngineError> {
        let name = self.name().to_string();
        let span = tracing::info_span!("engine_recognize", engine = %name, pages = pages.len());

        async move {
            let start = Instant::now();
            let recognition = match self {
                Self::Tesseract(e) => e.recognize(pages, options).await?,
                Self::Vision(e) => e.recognize(pages).await?,
                Self::Mock(e) => e.recognize(pages).await?,
            };
            let result = assemble(name, recognition, start.elapsed().as_millis() as u64);

            tracing::info!(
                confidence = result.confidence,
                tokens = result.token_count,
                elapsed_ms = result.elapsed_ms,
                "Engine recognition complete"
            );
            Ok::<_, EngineError>(result)
        }
        .instrument(span)
        .await
    }
}

fn assemble(engine_name: String, recognition: Recognition, elapsed_ms: u64) -> EngineResult {
    let Recognition {
        page_texts,
        token_confidences,
    } = recognition;

    let token_count = token_confidences.len();
    let confidence = mean_token_confidence(token_confidences);
    let text = page_texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);

    EngineResult {
        engine_name,
        text,
        page_count: page_texts.len(),
        page_texts,
        confidence,
        token_count,
        elapsed_ms,
    }
}
