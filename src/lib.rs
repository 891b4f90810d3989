//! HealthScan core: uploaded medical report bytes in, typed lab
//! measurements out.
//!
//! ```text
//! bytes + MIME ─▶ normalizer ─▶ OCR engines ─▶ combiner ─▶ metric extraction
//! ```
//!
//! Build one [`context::PipelineContext`] at startup, wrap it in a
//! [`pipeline::HealthReportProcessor`] and call `process` per upload.

pub mod config;
pub mod context;
pub mod models;
pub mod pipeline;

pub use config::{EngineSettings, PipelineOptions};
pub use context::PipelineContext;
pub use models::{HealthMetric, MetricCategory, MetricFlag, NormalRange};
pub use pipeline::{HealthReportProcessor, PipelineError, ProcessingOutcome};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("{} core v{}", config::APP_NAME, config::APP_VERSION);
    }
}
