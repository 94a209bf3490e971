use serde::{Deserialize, Serialize};

/// One retrieved document fragment attached to a lesson section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagChunk {
    pub id: String,
    pub content: String,
    pub relevance: f32,
    pub page: Option<u32>,
    pub section_pointer: Option<String>,
}

impl RagChunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>, relevance: f32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            relevance,
            page: None,
            section_pointer: None,
        }
    }
}
