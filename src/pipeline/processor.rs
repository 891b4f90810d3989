//! Health report processing orchestrator.
//!
//! Single entry point that drives the whole pipeline:
//! validate → normalize → OCR (single engine or ensemble) → merge pages →
//! sanitize → extract metrics.
//!
//! Pure function of (bytes, mime, options) plus the injected
//! `PipelineContext`. No persistence, no transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use super::ensemble::{EnsembleSettings, Provenance, SelectionConfig, METHOD_PDF_TEXT};
use super::extraction::confidence::thresholds;
use super::extraction::medical_correction::correct_medical_terms;
use super::extraction::format::InputFormat;
use super::extraction::{
    round_confidence, sanitize_extracted_text, text_layer_confidence, weighted_confidence,
    NormalizeOptions, NormalizedDocument, NormalizedPage, PageSource, QualityWarning,
};
use super::metrics::ExtractionWarning;
use super::ocr::{RecognizeOptions, PAGE_SEPARATOR};
use super::{InputError, PipelineError};
use crate::config::PipelineOptions;
use crate::context::PipelineContext;
use crate::models::{Document, HealthMetric};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Non-fatal findings gathered along the way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub quality_warnings: Vec<QualityWarning>,
    pub extraction_warnings: Vec<ExtractionWarning>,
}

/// Everything the reporting layer needs from one processed report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOutcome {
    pub text: String,
    /// 0–100.
    pub confidence: f64,
    pub page_count: usize,
    /// Engine name, "ensemble", or "pdf-text".
    pub processing_method: String,
    pub processing_time_ms: u64,
    /// Time spent in the OCR stage; 0 when no page needed OCR.
    pub ocr_time_ms: u64,
    pub metrics: Vec<HealthMetric>,
    pub provenance: Provenance,
    pub diagnostics: Diagnostics,
}

impl ProcessingOutcome {
    /// False means the file was read but held no recognizable lab values,
    /// which callers should report differently from a failed read.
    pub fn has_health_data(&self) -> bool {
        !self.metrics.is_empty()
    }
}

/// Merged text of all pages before metric extraction.
struct MergedText {
    text: String,
    confidence: f64,
    processing_method: String,
    ocr_time_ms: u64,
    provenance: Provenance,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Cheap to clone; every clone shares the same context.
#[derive(Clone)]
pub struct HealthReportProcessor {
    context: Arc<PipelineContext>,
}

impl HealthReportProcessor {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Process one uploaded report.
    ///
    /// Input is validated before any decoding. With `overall_timeout_ms`
    /// set, the whole call is bounded; hitting the bound drops the OCR
    /// stage, which aborts its engine tasks and kills their subprocesses.
    pub async fn process(
        &self,
        bytes: &[u8],
        mime_type: &str,
        options: &PipelineOptions,
    ) -> Result<ProcessingOutcome, PipelineError> {
        options.validate()?;
        validate_input(bytes, mime_type, options)?;
        self.dispatch(Document::new(bytes, mime_type), options).await
    }

    /// Same as [`process`](Self::process) for a caller-built [`Document`],
    /// e.g. one carrying the page count declared at upload.
    pub async fn process_document(
        &self,
        document: Document,
        options: &PipelineOptions,
    ) -> Result<ProcessingOutcome, PipelineError> {
        options.validate()?;
        validate_input(&document.bytes, &document.mime_type, options)?;
        self.dispatch(document, options).await
    }

    async fn dispatch(
        &self,
        document: Document,
        options: &PipelineOptions,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let span = info_span!(
            "process_report",
            document_id = %document.id,
            mime = %document.mime_type,
            size = document.size(),
        );

        let work = self.run(document, options).instrument(span);
        match options.overall_timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(Duration::from_millis(timeout_ms), work)
                .await
                .unwrap_or_else(|_| {
                    warn!(timeout_ms, "Processing deadline exceeded");
                    Err(PipelineError::Timeout { timeout_ms })
                }),
            None => work.await,
        }
    }

    async fn run(
        &self,
        document: Document,
        options: &PipelineOptions,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let start = Instant::now();

        // Step 1: Normalize (CPU-bound)
        let normalized = self.normalize(&document, options).await?;
        info!(
            pages = normalized.page_count(),
            needs_ocr = normalized.needs_ocr(),
            quality_warnings = normalized.warnings.len(),
            "Processing: document normalized"
        );
        if let Some(declared) = document.declared_page_count {
            if declared != normalized.page_count() {
                warn!(declared, decoded = normalized.page_count(), "Page count differs from upload metadata");
            }
        }

        // Step 2: OCR the pages that need it and merge in page order
        let merged = if normalized.needs_ocr() {
            self.recognize(&normalized, options).await?
        } else {
            merge_text_layer(&normalized)
        };

        // Step 3: Extract metrics
        let extraction = self.context.registry.extract(&merged.text, options.window_chars);

        let outcome = ProcessingOutcome {
            text: merged.text,
            confidence: round_confidence(merged.confidence),
            page_count: normalized.page_count(),
            processing_method: merged.processing_method,
            processing_time_ms: start.elapsed().as_millis() as u64,
            ocr_time_ms: merged.ocr_time_ms,
            metrics: extraction.metrics,
            provenance: merged.provenance,
            diagnostics: Diagnostics {
                quality_warnings: normalized.warnings,
                extraction_warnings: extraction.warnings,
            },
        };

        if outcome.confidence < thresholds::LOW {
            warn!(
                confidence = outcome.confidence,
                method = %outcome.processing_method,
                "Low-confidence extraction"
            );
        }
        info!(
            method = %outcome.processing_method,
            confidence = outcome.confidence,
            metrics = outcome.metrics.len(),
            elapsed_ms = outcome.processing_time_ms,
            "Processing complete"
        );

        Ok(outcome)
    }

    async fn normalize(
        &self,
        document: &Document,
        options: &PipelineOptions,
    ) -> Result<NormalizedDocument, PipelineError> {
        let normalizer = Arc::clone(&self.context.normalizer);
        let bytes = Arc::clone(&document.bytes);
        let mime_type = document.mime_type.clone();
        let normalize_options = NormalizeOptions {
            preprocess: options.preprocess_options(),
            dpi: options.render_dpi,
        };

        let normalized = tokio::task::spawn_blocking(move || {
            normalizer.normalize(&bytes, &mime_type, &normalize_options)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("normalization task failed: {e}")))??;
        Ok(normalized)
    }

    async fn recognize(
        &self,
        normalized: &NormalizedDocument,
        options: &PipelineOptions,
    ) -> Result<MergedText, PipelineError> {
        let pages: Arc<[NormalizedPage]> = normalized.raster_pages().into();
        let config = selection_config(options);

        info!(
            raster_pages = pages.len(),
            preference = ?config.preference,
            "Processing: starting OCR"
        );
        let ocr = self.context.selector.run(pages, &config).await?;

        let mut raster_texts = ocr.page_texts.iter();
        let mut segments: Vec<(String, f64)> = Vec::with_capacity(normalized.page_count());
        for page in &normalized.pages {
            match page {
                PageSource::TextLayer { text, .. } => {
                    segments.push((sanitize_extracted_text(text), thresholds::TEXT_LAYER));
                }
                PageSource::Raster(_) => {
                    let raw = raster_texts.next().map(String::as_str).unwrap_or("");
                    let corrected = correct_medical_terms(raw);
                    segments.push((sanitize_extracted_text(&corrected), ocr.confidence));
                }
            }
        }

        let all_raster = normalized.text_layer_pages().is_empty();
        let confidence = if all_raster {
            ocr.confidence
        } else {
            let weighted: Vec<(&str, f64)> = segments.iter().map(|(t, c)| (t.as_str(), *c)).collect();
            weighted_confidence(&weighted)
        };

        Ok(MergedText {
            text: join_pages(segments.iter().map(|(t, _)| t.as_str())),
            confidence,
            processing_method: ocr.processing_method,
            ocr_time_ms: ocr.processing_time_ms,
            provenance: ocr.provenance,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Cheap checks that must pass before any bytes are decoded.
fn validate_input(bytes: &[u8], mime_type: &str, options: &PipelineOptions) -> Result<(), InputError> {
    if bytes.is_empty() {
        return Err(InputError::Empty);
    }
    let size = bytes.len() as u64;
    if size > options.max_file_size_bytes {
        return Err(InputError::TooLarge {
            size,
            limit: options.max_file_size_bytes,
        });
    }
    if InputFormat::from_mime(mime_type).is_none() || !options.allows_mime(mime_type) {
        return Err(InputError::UnsupportedMime(mime_type.to_string()));
    }
    Ok(())
}

fn selection_config(options: &PipelineOptions) -> SelectionConfig {
    SelectionConfig {
        preference: options.preferred_engine.clone(),
        default_engine: options.default_engine.clone(),
        per_engine_timeout: Duration::from_millis(options.per_engine_timeout_ms),
        ensemble: EnsembleSettings {
            similarity_threshold: options.similarity_threshold,
            agreement_boost: options.agreement_boost,
        },
        recognize: RecognizeOptions {
            language: options.ocr_language.clone(),
        },
    }
}

/// Every page came from the PDF text layer; no engine involved.
fn merge_text_layer(normalized: &NormalizedDocument) -> MergedText {
    let pages = normalized.text_layer_pages();
    let texts: Vec<String> = pages
        .iter()
        .map(|(_, text)| sanitize_extracted_text(text))
        .collect();

    MergedText {
        text: join_pages(texts.iter().map(String::as_str)),
        confidence: text_layer_confidence(pages.len(), normalized.page_count()),
        processing_method: METHOD_PDF_TEXT.to_string(),
        ocr_time_ms: 0,
        provenance: Provenance::default(),
    }
}

fn join_pages<'a>(pages: impl Iterator<Item = &'a str>) -> String {
    pages
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
