//! Deterministic in-process engine for tests and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::types::{EngineHealth, Recognition};
use super::EngineError;
use crate::pipeline::extraction::NormalizedPage;

/// Returns canned text for every page.
///
/// Clones share one invocation counter, so a test can hand a clone to the
/// pipeline and still observe how often it was called.
#[derive(Debug, Clone)]
pub struct MockEngine {
    name: String,
    text: String,
    confidence: f64,
    delay: Option<Duration>,
    failure: Option<String>,
    healthy: bool,
    calls: Arc<AtomicUsize>,
}

impl MockEngine {
    pub fn new(name: &str, text: &str, confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
            confidence: confidence.clamp(0.0, 100.0),
            delay: None,
            failure: None,
            healthy: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside every `recognize` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every `recognize` call fails with `reason`.
    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    /// Healthcheck reports unhealthy.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of `recognize` invocations so far, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn healthcheck(&self) -> EngineHealth {
        if self.healthy {
            EngineHealth::Healthy
        } else {
            EngineHealth::Unhealthy("mock configured unhealthy".into())
        }
    }

    pub async fn recognize(&self, pages: &[NormalizedPage]) -> Result<Recognition, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(EngineError::failed(&self.name, reason.clone()));
        }

        let tokens_per_page = self.text.split_whitespace().count();
        Ok(Recognition {
            page_texts: vec![self.text.clone(); pages.len()],
            token_confidences: vec![self.confidence; tokens_per_page * pages.len()],
        })
    }
}
