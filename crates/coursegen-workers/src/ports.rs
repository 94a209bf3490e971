//! Worker-crate-owned ports for collaborators this pipeline treats as
//! external and out of scope: document parsing/OCR internals, and
//! vector-store ingestion. These are distinct from
//! [`coursegen_rag::VectorStore`], which is query-side only — S2 writes,
//! the RAG context builder reads.

use async_trait::async_trait;
use coursegen_llm::{CompletionRequest, CompletionResponse, GatewayClient, LlmError};
use uuid::Uuid;

use crate::error::StageError;

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub markdown: String,
}

/// S2's document parsing/OCR collaborator. This pipeline assumes a
/// working parser exists; it does not implement one. Chunking is this
/// crate's own concern (see `s2::chunk_markdown`), so the port's output
/// is the flat markdown, not pre-chunked text.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(
        &self,
        file_path: &str,
        mime_type: &str,
    ) -> Result<ParsedDocument, StageError>;
}

/// S2's vector-store ingestion collaborator. Chunk embedding and index
/// writes are assumed to work; they are not reimplemented here.
#[async_trait]
pub trait ChunkIndexer: Send + Sync {
    async fn index(
        &self,
        course_id: Uuid,
        file_id: Uuid,
        chunks: &[String],
    ) -> Result<(), StageError>;
}

/// The single LLM operation S3/S4/S5 need, mirroring
/// `coursegen_lesson_graph::Completions` so every crate that talks to
/// the gateway tests against its own scripted fake instead of sharing
/// one trait object across crate boundaries.
#[async_trait]
pub trait Completions: Send + Sync {
    async fn complete_with_escalation(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError>;
}

#[async_trait]
impl Completions for GatewayClient {
    async fn complete_with_escalation(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        GatewayClient::complete_with_escalation(self, request).await
    }
}
