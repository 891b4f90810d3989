use std::sync::Arc;

use uuid::Uuid;

/// Raw input handed over by the upload collaborator.
///
/// Immutable for the lifetime of one processing call. `id` only
/// correlates log lines; it is never persisted.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub bytes: Arc<[u8]>,
    pub mime_type: String,
    pub declared_page_count: Option<usize>,
}

impl Document {
    pub fn new(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes: Arc::from(bytes),
            mime_type: mime_type.to_string(),
            declared_page_count: None,
        }
    }

    pub fn with_declared_page_count(mut self, pages: usize) -> Self {
        self.declared_page_count = Some(pages);
        self
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
