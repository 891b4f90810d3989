pub mod types;
pub mod format;
pub mod confidence;
pub mod sanitize;
pub mod preprocess;
pub mod raster;
pub mod pdf;
pub mod pdfium;
pub mod pdf_renderer;
pub mod medical_correction;
pub mod normalizer;

#[cfg(test)]
pub(crate) mod fixtures;

pub use types::*;
pub use confidence::*;
pub use sanitize::*;
pub use preprocess::*;
pub use pdf::*;
pub use normalizer::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),
}

impl NormalizationError {
    /// Unsupported or undecodable input never succeeds on retry.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::CorruptInput(_))
    }
}
