use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use coursegen_types::RagChunk;

use crate::error::RagError;
use crate::port::VectorStore;

/// In-memory vector store fake used by builder/lesson-graph unit tests.
#[derive(Default)]
pub struct MemoryVectorStore {
    by_context_id: Mutex<HashMap<String, Vec<RagChunk>>>,
    by_query: Mutex<HashMap<String, Vec<RagChunk>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_context(&self, rag_context_id: &str, chunks: Vec<RagChunk>) {
        self.by_context_id
            .lock()
            .unwrap()
            .insert(rag_context_id.to_string(), chunks);
    }

    pub fn seed_query(&self, query: &str, chunks: Vec<RagChunk>) {
        self.by_query.lock().unwrap().insert(query.to_string(), chunks);
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn fetch_by_context_id(
        &self,
        rag_context_id: &str,
        top_k: usize,
    ) -> Result<Vec<RagChunk>, RagError> {
        let mut chunks = self
            .by_context_id
            .lock()
            .unwrap()
            .get(rag_context_id)
            .cloned()
            .unwrap_or_default();
        chunks.truncate(top_k);
        Ok(chunks)
    }

    async fn search(&self, _collection: &str, query: &str, top_k: usize) -> Result<Vec<RagChunk>, RagError> {
        let mut chunks = self.by_query.lock().unwrap().get(query).cloned().unwrap_or_default();
        chunks.truncate(top_k);
        Ok(chunks)
    }
}
