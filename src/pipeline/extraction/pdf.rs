use super::types::PdfTextSource;
use super::NormalizationError;

/// Trimmed text longer than this makes a page a text-layer page.
pub const MIN_TEXT_LAYER_CHARS: usize = 20;

/// Digital PDF text layer via `pdf-extract`.
pub struct PdfTextExtractor;

impl PdfTextSource for PdfTextExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, NormalizationError> {
        // pdf-extract panics on some malformed font tables; treat that as no text layer.
        let result = std::panic::catch_unwind(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        })
        .map_err(|_| NormalizationError::CorruptInput("PDF text extraction panicked".into()))?;

        result.map_err(|e| map_extract_error(&e.to_string()))
    }
}

fn map_extract_error(message: &str) -> NormalizationError {
    let lower = message.to_lowercase();
    if lower.contains("encrypt") || lower.contains("password") {
        NormalizationError::PdfEncrypted
    } else {
        NormalizationError::CorruptInput(format!("PDF parsing failed: {message}"))
    }
}

/// Whether a page's extracted text is substantial enough to skip OCR.
pub fn has_text_layer(text: &str) -> bool {
    text.trim().chars().count() > MIN_TEXT_LAYER_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::fixtures::make_text_pdf;

    #[test]
    fn extract_text_from_digital_pdf() {
        let pdf_bytes = make_text_pdf(&["Glucose 85 mg/dL 70-100 fasting sample"]);
        let pages = PdfTextExtractor.extract_pages(&pdf_bytes).unwrap();

        assert_eq!(pages.len(), 1);
        assert!(
            pages[0].contains("Glucose"),
            "Expected text to contain 'Glucose', got: {}",
            pages[0]
        );
        assert!(has_text_layer(&pages[0]));
    }

    #[test]
    fn extracts_each_page_separately() {
        let pdf_bytes = make_text_pdf(&[
            "Complete blood count results page one",
            "Lipid panel results on the second page",
        ]);
        let pages = PdfTextExtractor.extract_pages(&pdf_bytes).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("blood"));
        assert!(pages[1].contains("Lipid"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let result = PdfTextExtractor.extract_pages(b"not a pdf");
        assert!(matches!(result, Err(NormalizationError::CorruptInput(_))));
    }

    #[test]
    fn text_layer_threshold() {
        assert!(!has_text_layer(""));
        assert!(!has_text_layer("   short text   \n"));
        assert!(!has_text_layer("exactly twenty chars"));
        assert!(has_text_layer("twenty-one characters"));
    }

    #[test]
    fn encryption_errors_are_recognized() {
        assert_eq!(
            map_extract_error("document is encrypted"),
            NormalizationError::PdfEncrypted
        );
        assert!(matches!(
            map_extract_error("unexpected EOF"),
            NormalizationError::CorruptInput(_)
        ));
    }
}
