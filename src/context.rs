//! Process-wide pipeline wiring.
//!
//! Built once at startup and shared behind `Arc`. Nothing in here changes
//! after construction, so concurrent `process` calls only share read-only
//! state plus the engine worker pool.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{EngineSettings, DEFAULT_MAX_CONCURRENT_ENGINES};
use crate::pipeline::ensemble::EngineSelector;
use crate::pipeline::extraction::DocumentNormalizer;
use crate::pipeline::metrics::MetricRegistry;
use crate::pipeline::ocr::{OcrEngine, TesseractEngine, VisionEngine};

pub struct PipelineContext {
    pub normalizer: Arc<DocumentNormalizer>,
    pub selector: EngineSelector,
    pub registry: &'static MetricRegistry,
    /// Caps concurrent engine invocations across all calls.
    pub permits: Arc<Semaphore>,
}

impl PipelineContext {
    /// Tesseract and the Ollama vision engine, wired from `settings`.
    ///
    /// A vision engine whose HTTP client cannot be built is left out; an
    /// engine that is merely offline stays registered and reports itself
    /// unavailable at call time.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let mut engines = vec![OcrEngine::Tesseract(TesseractEngine::from_settings(settings))];
        match VisionEngine::from_settings(settings) {
            Ok(vision) => engines.push(OcrEngine::Vision(vision)),
            Err(e) => warn!(error = %e, "Vision engine disabled"),
        }

        let context = Self::build(
            DocumentNormalizer::with_default_collaborators(),
            engines,
            settings.max_concurrent_engines,
        );
        info!(
            engines = ?context.selector.engine_names(),
            max_concurrent = settings.max_concurrent_engines,
            full_page_render = context.normalizer.renders_full_page(),
            "Pipeline context ready"
        );
        context
    }

    /// Defaults plus `TESSERACT_*`, `OLLAMA_HOST` and `HEALTHSCAN_*` overrides.
    pub fn from_env() -> Self {
        Self::from_settings(&EngineSettings::from_env())
    }

    /// Explicit engine set with the default normalizer.
    pub fn with_engines(engines: Vec<OcrEngine>) -> Self {
        Self::build(
            DocumentNormalizer::with_default_collaborators(),
            engines,
            DEFAULT_MAX_CONCURRENT_ENGINES,
        )
    }

    pub fn with_normalizer(mut self, normalizer: DocumentNormalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    fn build(normalizer: DocumentNormalizer, engines: Vec<OcrEngine>, max_concurrent: usize) -> Self {
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        Self {
            normalizer: Arc::new(normalizer),
            selector: EngineSelector::new(engines, Arc::clone(&permits)),
            registry: MetricRegistry::standard(),
            permits,
        }
    }
}
