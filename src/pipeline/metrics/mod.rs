pub mod units;
pub mod flag;
pub mod rules;
pub mod extractor;

pub use extractor::{extract, extract_with_diagnostics};
pub use flag::compute_flag;
pub use rules::{ExtractionRule, MetricRegistry};

use serde::Serialize;

use crate::models::HealthMetric;

/// Non-fatal finding attached to an extracted metric.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExtractionWarning {
    #[error("{metric}: unit '{unit}' not recognized, kept verbatim")]
    #[serde(rename_all = "camelCase")]
    UnnormalizedUnit { metric: String, unit: String },

    #[error("{metric}: no reference range found, flag defaulted to NORMAL")]
    #[serde(rename_all = "camelCase")]
    RangeNotFound { metric: String },

    #[error("{metric}: {kept} kept over conflicting values {discarded:?}")]
    #[serde(rename_all = "camelCase")]
    AmbiguousDuplicate {
        metric: String,
        kept: f64,
        discarded: Vec<f64>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricExtraction {
    /// In order of appearance in the text.
    pub metrics: Vec<HealthMetric>,
    pub warnings: Vec<ExtractionWarning>,
}
