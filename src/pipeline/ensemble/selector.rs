//! Engine selection: single engine with one fallback, or a concurrent ensemble.
//!
//! Every engine invocation holds a permit from the process-wide worker pool
//! and is bounded by the per-engine timeout, permit wait included. Ensemble
//! tasks live in a `JoinSet`; dropping the selector future aborts them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::combiner::{combine, EnsembleSettings};
use super::{OcrResult, Provenance, METHOD_ENSEMBLE};
use crate::config::{EnginePreference, DEFAULT_ENGINE, DEFAULT_PER_ENGINE_TIMEOUT_MS};
use crate::pipeline::extraction::NormalizedPage;
use crate::pipeline::ocr::{
    EngineError, EngineFailure, EngineHealth, EngineResult, OcrEngine, RecognizeOptions,
};
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    pub preference: EnginePreference,
    /// Fallback target in single-engine mode.
    pub default_engine: String,
    pub per_engine_timeout: Duration,
    pub ensemble: EnsembleSettings,
    pub recognize: RecognizeOptions,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            preference: EnginePreference::Named(DEFAULT_ENGINE.to_string()),
            default_engine: DEFAULT_ENGINE.to_string(),
            per_engine_timeout: Duration::from_millis(DEFAULT_PER_ENGINE_TIMEOUT_MS),
            ensemble: EnsembleSettings::default(),
            recognize: RecognizeOptions::default(),
        }
    }
}

/// Result of one engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    Completed(EngineResult),
    TimedOut { engine: String, timeout_ms: u64 },
    Failed(EngineError),
    Unavailable(EngineError),
}

impl EngineOutcome {
    fn from_error(error: EngineError) -> Self {
        match error.reason {
            EngineFailure::Unavailable(_) => Self::Unavailable(error),
            EngineFailure::Timeout(timeout_ms) => Self::TimedOut {
                engine: error.engine,
                timeout_ms,
            },
            EngineFailure::Failed(_) => Self::Failed(error),
        }
    }

    /// `Err` with the failure for anything but `Completed`.
    pub fn into_result(self) -> Result<EngineResult, EngineError> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::TimedOut { engine, timeout_ms } => Err(EngineError::timeout(&engine, timeout_ms)),
            Self::Failed(e) | Self::Unavailable(e) => Err(e),
        }
    }
}

pub struct EngineSelector {
    engines: Vec<Arc<OcrEngine>>,
    permits: Arc<Semaphore>,
}

impl EngineSelector {
    pub fn new(engines: Vec<OcrEngine>, permits: Arc<Semaphore>) -> Self {
        Self {
            engines: engines.into_iter().map(Arc::new).collect(),
            permits,
        }
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<OcrEngine>> {
        self.engines.iter().find(|e| e.name() == name)
    }

    pub async fn run(
        &self,
        pages: Arc<[NormalizedPage]>,
        config: &SelectionConfig,
    ) -> Result<OcrResult, PipelineError> {
        let start = Instant::now();
        let mut result = match &config.preference {
            EnginePreference::Ensemble => self.run_ensemble(pages, config).await?,
            EnginePreference::Named(name) => self.run_single(name, pages, config).await?,
        };
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn run_single(
        &self,
        preferred: &str,
        pages: Arc<[NormalizedPage]>,
        config: &SelectionConfig,
    ) -> Result<OcrResult, PipelineError> {
        let mut candidates = vec![preferred];
        if config.default_engine != preferred {
            candidates.push(config.default_engine.as_str());
        }

        let mut failures = Vec::new();
        let mut fallback_from = None;

        for (attempt, name) in candidates.into_iter().enumerate() {
            let outcome = match self.find(name) {
                Some(engine) => {
                    invoke_engine(
                        Arc::clone(engine),
                        Arc::clone(&pages),
                        Arc::clone(&self.permits),
                        config.per_engine_timeout,
                        config.recognize.clone(),
                    )
                    .await
                }
                None => EngineOutcome::Unavailable(EngineError::unavailable(name, "not registered")),
            };

            match outcome.into_result() {
                Ok(result) => {
                    info!(engine = name, fallback = attempt > 0, "Single-engine OCR complete");
                    return Ok(OcrResult {
                        text: result.text,
                        page_texts: result.page_texts,
                        confidence: result.confidence,
                        page_count: result.page_count,
                        processing_method: result.engine_name.clone(),
                        processing_time_ms: 0,
                        provenance: Provenance {
                            engines: vec![result.engine_name],
                            agreeing_engines: Vec::new(),
                            fallback_from,
                            failures,
                        },
                    });
                }
                Err(e) => {
                    warn!(engine = name, error = %e, "OCR engine did not produce a result");
                    failures.push(e);
                    if attempt == 0 {
                        fallback_from = Some(name.to_string());
                    }
                }
            }
        }

        Err(PipelineError::AllEnginesFailed { failures })
    }

    async fn run_ensemble(
        &self,
        pages: Arc<[NormalizedPage]>,
        config: &SelectionConfig,
    ) -> Result<OcrResult, PipelineError> {
        let mut tasks = JoinSet::new();
        for engine in &self.engines {
            let engine = Arc::clone(engine);
            let pages = Arc::clone(&pages);
            let permits = Arc::clone(&self.permits);
            let timeout = config.per_engine_timeout;
            let options = config.recognize.clone();
            tasks.spawn(async move {
                let name = engine.name().to_string();
                (name, invoke_engine(engine, pages, permits, timeout, options).await)
            });
        }

        let mut completed = Vec::new();
        let mut failures = Vec::new();
        let mut reported: Vec<String> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    reported.push(name);
                    match outcome.into_result() {
                        Ok(result) => completed.push(result),
                        Err(e) => {
                            warn!(engine = %e.engine, error = %e, "Ensemble member failed");
                            failures.push(e);
                        }
                    }
                }
                Err(join_error) => warn!(error = %join_error, "Ensemble task aborted"),
            }
        }

        // A panicked task never reports its name
        for engine in &self.engines {
            if !reported.iter().any(|n| n == engine.name()) {
                failures.push(EngineError::failed(engine.name(), "engine task panicked"));
            }
        }
        failures.sort_by(|a, b| a.engine.cmp(&b.engine));

        // Pairwise edit distance is CPU-bound on long texts
        let settings = config.ensemble;
        let combined = tokio::task::spawn_blocking(move || combine(completed, &settings))
            .await
            .map_err(|e| PipelineError::Internal(format!("combination task failed: {e}")))?;
        let Some(combination) = combined else {
            return Err(PipelineError::AllEnginesFailed { failures });
        };

        info!(
            chosen = %combination.chosen.engine_name,
            confidence = combination.confidence,
            agreeing = combination.agreeing_engines.len(),
            failed = failures.len(),
            "Ensemble OCR complete"
        );

        Ok(OcrResult {
            text: combination.chosen.text,
            page_texts: combination.chosen.page_texts,
            confidence: combination.confidence,
            page_count: combination.chosen.page_count,
            processing_method: METHOD_ENSEMBLE.to_string(),
            processing_time_ms: 0,
            provenance: Provenance {
                engines: combination.contributors,
                agreeing_engines: combination.agreeing_engines,
                fallback_from: None,
                failures,
            },
        })
    }
}

/// Permit, healthcheck and recognition under one deadline.
async fn invoke_engine(
    engine: Arc<OcrEngine>,
    pages: Arc<[NormalizedPage]>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    options: RecognizeOptions,
) -> EngineOutcome {
    let name = engine.name().to_string();
    let timeout_ms = timeout.as_millis() as u64;

    let attempt = async {
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|_| EngineError::failed(&name, "worker pool closed"))?;

        if let EngineHealth::Unhealthy(reason) = engine.healthcheck(&options).await {
            return Err(EngineError::unavailable(&name, reason));
        }

        engine.recognize(&pages, &options).await
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(result)) => EngineOutcome::Completed(result),
        Ok(Err(e)) => EngineOutcome::from_error(e),
        Err(_) => EngineOutcome::TimedOut {
            engine: name,
            timeout_ms,
        },
    }
}
