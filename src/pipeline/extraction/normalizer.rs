//! Document normalizer: raw upload bytes to OCR-ready pages.
//!
//! PDFs keep every page whose text layer is usable; the remaining pages are
//! rasterized and run through the same preprocessing chain as uploaded
//! images. Output pages are always in document order.

use tracing::{debug, info, warn};

use super::format::{canonical_mime, sniff_format, InputFormat};
use super::pdf::{has_text_layer, PdfTextExtractor};
use super::pdf_renderer::LopdfImageExtractor;
use super::pdfium::PdfiumRenderer;
use super::preprocess::{decode_image, PreparedPage, PreprocessOptions, PreprocessingPipeline};
use super::types::{
    NormalizedDocument, NormalizedPage, PageSource, PdfPageRenderer, PdfTextSource, QualityIssue,
    QualityWarning,
};
use super::NormalizationError;
use crate::config::{DEFAULT_RENDER_DPI, MIN_RENDER_DPI};

/// Per-call normalization settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    pub preprocess: PreprocessOptions,
    pub dpi: u32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            preprocess: PreprocessOptions::standard(),
            dpi: DEFAULT_RENDER_DPI,
        }
    }
}

/// Converts a document into `NormalizedDocument`. Stateless per call.
pub struct DocumentNormalizer {
    text_source: Box<dyn PdfTextSource>,
    renderer: Box<dyn PdfPageRenderer>,
}

impl DocumentNormalizer {
    pub fn new(text_source: Box<dyn PdfTextSource>, renderer: Box<dyn PdfPageRenderer>) -> Self {
        Self {
            text_source,
            renderer,
        }
    }

    /// pdf-extract text layer plus the best available page renderer.
    pub fn with_default_collaborators() -> Self {
        Self::new(Box::new(PdfTextExtractor), default_page_renderer())
    }

    pub fn renders_full_page(&self) -> bool {
        self.renderer.renders_full_page()
    }

    pub fn normalize(
        &self,
        bytes: &[u8],
        mime_type: &str,
        options: &NormalizeOptions,
    ) -> Result<NormalizedDocument, NormalizationError> {
        let format = resolve_format(bytes, mime_type)?;
        let pipeline = PreprocessingPipeline::new(options.preprocess);

        let document = if format.is_pdf() {
            self.normalize_pdf(bytes, &pipeline, options.dpi.max(MIN_RENDER_DPI))?
        } else {
            let prepared = pipeline.prepare_bytes(bytes)?;
            let mut warnings = Vec::new();
            let page = into_page(1, prepared, &mut warnings);
            NormalizedDocument {
                format,
                pages: vec![PageSource::Raster(page)],
                warnings,
            }
        };

        info!(
            format = format.mime_type(),
            pages = document.page_count(),
            raster_pages = document.raster_pages().len(),
            warnings = document.warnings.len(),
            "Document normalized"
        );

        Ok(document)
    }

    fn normalize_pdf(
        &self,
        bytes: &[u8],
        pipeline: &PreprocessingPipeline,
        dpi: u32,
    ) -> Result<NormalizedDocument, NormalizationError> {
        let page_texts = match self.text_source.extract_pages(bytes) {
            Ok(pages) => pages,
            Err(NormalizationError::PdfEncrypted) => return Err(NormalizationError::PdfEncrypted),
            Err(e) => {
                // Broken text layer; the renderer gets the final word.
                warn!(error = %e, "PDF text layer unreadable, rasterizing all pages");
                Vec::new()
            }
        };

        let page_count = if page_texts.is_empty() {
            self.renderer.page_count(bytes)?
        } else {
            page_texts.len()
        };
        if page_count == 0 {
            return Err(NormalizationError::CorruptInput("PDF has no pages".into()));
        }

        let mut pages = Vec::with_capacity(page_count);
        let mut warnings = Vec::new();

        for page_index in 0..page_count {
            let page_number = page_index + 1;
            let text = page_texts.get(page_index).map(String::as_str).unwrap_or("");

            if has_text_layer(text) {
                pages.push(PageSource::TextLayer {
                    page_number,
                    text: text.to_string(),
                });
                continue;
            }

            debug!(page = page_number, dpi, "No text layer, rasterizing page");
            let png = self.renderer.render_page(bytes, page_index, dpi)?;
            let img = decode_image(&png).map_err(|e| NormalizationError::PdfRendering {
                page: page_number,
                reason: format!("Rendered page could not be decoded: {e}"),
            })?;
            let prepared = pipeline.prepare_image(img)?;

            if !self.renderer.renders_full_page() {
                warnings.push(QualityWarning {
                    page: page_number,
                    issue: QualityIssue::EmbeddedImageOnly,
                });
            }
            pages.push(PageSource::Raster(into_page(page_number, prepared, &mut warnings)));
        }

        Ok(NormalizedDocument {
            format: InputFormat::Pdf,
            pages,
            warnings,
        })
    }
}

/// Declared MIME must be supported; sniffed magic bytes decide decoding.
fn resolve_format(bytes: &[u8], mime_type: &str) -> Result<InputFormat, NormalizationError> {
    let canonical = canonical_mime(mime_type);
    let declared = InputFormat::from_mime(&canonical)
        .ok_or_else(|| NormalizationError::UnsupportedFormat(mime_type.to_string()))?;

    match sniff_format(bytes) {
        Some(sniffed) if sniffed != declared => {
            warn!(
                declared = declared.mime_type(),
                sniffed = sniffed.mime_type(),
                "Declared MIME type does not match content, using sniffed format"
            );
            Ok(sniffed)
        }
        _ => Ok(declared),
    }
}

fn into_page(
    page_number: usize,
    prepared: PreparedPage,
    warnings: &mut Vec<QualityWarning>,
) -> NormalizedPage {
    warnings.extend(prepared.issues.into_iter().map(|issue| QualityWarning {
        page: page_number,
        issue,
    }));
    NormalizedPage {
        page_number,
        png_bytes: prepared.png_bytes,
        width: prepared.width,
        height: prepared.height,
        flags: prepared.flags,
        skew_angle: prepared.skew_angle,
    }
}

/// PDFium when the library can be bound, embedded-image extraction otherwise.
pub fn default_page_renderer() -> Box<dyn PdfPageRenderer> {
    match PdfiumRenderer::new() {
        Ok(renderer) => {
            info!("Using PDFium for scanned PDF pages");
            Box::new(renderer)
        }
        Err(e) => {
            warn!(error = %e, "PDFium unavailable, falling back to embedded image extraction");
            Box::new(LopdfImageExtractor)
        }
    }
}
