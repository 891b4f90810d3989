pub mod document;
pub mod enums;
pub mod metric;

pub use document::Document;
pub use enums::{MetricCategory, MetricFlag};
pub use metric::{HealthMetric, NormalRange};

/// Raised when a stored string does not name a known enum variant.
#[derive(Debug, thiserror::Error)]
#[error("Invalid {field} value: {value}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}
