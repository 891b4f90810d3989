//! Confidence arithmetic on the 0–100 scale shared by every engine.

/// Confidence reference points.
pub mod thresholds {
    /// Below this the outcome gets a low-confidence log line.
    pub const LOW: f64 = 50.0;

    /// Confidence of a fully digital PDF text layer.
    pub const TEXT_LAYER: f64 = 95.0;
}

/// Digital PDFs: base 95, scaled by ratio of pages with text.
pub fn text_layer_confidence(pages_with_text: usize, total_pages: usize) -> f64 {
    if total_pages == 0 {
        return 0.0;
    }
    thresholds::TEXT_LAYER * pages_with_text as f64 / total_pages as f64
}

/// Mean of per-token confidences; no tokens means 0, not an error.
pub fn mean_token_confidence<I>(tokens: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = tokens
        .into_iter()
        .fold((0.0, 0usize), |(s, n), c| (s + c.clamp(0.0, 100.0), n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Merge `(text, confidence)` segments weighted by text length.
///
/// Used when text-layer pages and OCR pages of one PDF are combined.
pub fn weighted_confidence(segments: &[(&str, f64)]) -> f64 {
    let total_chars: usize = segments.iter().map(|(t, _)| t.chars().count()).sum();
    if total_chars == 0 {
        return 0.0;
    }

    let weighted_sum: f64 = segments
        .iter()
        .map(|(t, c)| c * t.chars().count() as f64)
        .sum();

    (weighted_sum / total_chars as f64).clamp(0.0, 100.0)
}

/// Round to two decimals for reporting.
pub fn round_confidence(confidence: f64) -> f64 {
    (confidence * 100.0).round() / 100.0
}
