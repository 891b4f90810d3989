use serde::{Deserialize, Serialize};

use super::format::InputFormat;
use super::NormalizationError;

/// Which preprocessing stages actually changed a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessFlags {
    pub grayscale: bool,
    pub contrast_normalized: bool,
    pub denoised: bool,
    pub deskewed: bool,
    pub upscaled: bool,
    pub binarized: bool,
}

/// One OCR-ready raster page.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    /// 1-based page number in the source document.
    pub page_number: usize,
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub flags: PreprocessFlags,
    /// Detected skew before correction, in degrees.
    pub skew_angle: Option<f32>,
}

/// A logical page after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum PageSource {
    /// PDF page whose embedded text layer was usable.
    TextLayer { page_number: usize, text: String },
    /// Page that must go through OCR.
    Raster(NormalizedPage),
}

impl PageSource {
    pub fn page_number(&self) -> usize {
        match self {
            Self::TextLayer { page_number, .. } => *page_number,
            Self::Raster(page) => page.page_number,
        }
    }
}

/// Output of the normalizer, pages in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    pub format: InputFormat,
    pub pages: Vec<PageSource>,
    pub warnings: Vec<QualityWarning>,
}

impl NormalizedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Raster pages in page order, ready to hand to the engines.
    pub fn raster_pages(&self) -> Vec<NormalizedPage> {
        self.pages
            .iter()
            .filter_map(|p| match p {
                PageSource::Raster(page) => Some(page.clone()),
                PageSource::TextLayer { .. } => None,
            })
            .collect()
    }

    pub fn text_layer_pages(&self) -> Vec<(usize, &str)> {
        self.pages
            .iter()
            .filter_map(|p| match p {
                PageSource::TextLayer { page_number, text } => Some((*page_number, text.as_str())),
                PageSource::Raster(_) => None,
            })
            .collect()
    }

    pub fn needs_ocr(&self) -> bool {
        self.pages.iter().any(|p| matches!(p, PageSource::Raster(_)))
    }
}

/// Image quality problems found on a page. Never block extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    BlankPage,
    DarkPage,
    BlurryImage,
    SkewedDocument { angle_degrees: f32 },
    PoorContrast,
    /// Page image came from an embedded scan, not a full render.
    EmbeddedImageOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityWarning {
    pub page: usize,
    #[serde(flatten)]
    pub issue: QualityIssue,
}

/// PDF text layer abstraction (allows mocking for tests).
pub trait PdfTextSource: Send + Sync {
    /// Text of every page, in page order. Pages without a text layer yield "".
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, NormalizationError>;
}

/// Renders a single PDF page to PNG bytes for OCR.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, NormalizationError>;

    /// `page_index` is 0-based.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, NormalizationError>;

    /// Whether output is a true page render (as opposed to an embedded image).
    fn renders_full_page(&self) -> bool {
        true
    }
}
