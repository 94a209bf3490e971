use async_trait::async_trait;
use coursegen_types::RagChunk;

use crate::error::RagError;

/// The vector store's query-side contract. Ingestion/indexing is the
/// external collaborator's own concern; this port only covers the reads
/// the context builder needs: a pre-assigned context id, and an ad hoc text search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn fetch_by_context_id(
        &self,
        rag_context_id: &str,
        top_k: usize,
    ) -> Result<Vec<RagChunk>, RagError>;

    async fn search(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RagChunk>, RagError>;
}
