use std::sync::Arc;

use async_trait::async_trait;
use coursegen_types::RagChunk;
use pgvector::Vector;
use sqlx::PgPool;

use crate::error::RagError;
use crate::port::VectorStore;

/// Embeds a query string into the vector space the `rag_chunks` table was
/// populated in. Embedding generation is an external collaborator's
/// concern (the document-processing pipeline owns it); this adapter only
/// depends on the narrow callback it needs to turn a query into a vector.
pub type QueryEmbedder = Arc<dyn Fn(&str) -> Vec<f32> + Send + Sync>;

/// Query-side pgvector adapter. Mirrors the cosine-distance query shape
/// used elsewhere in this codebase for semantic matching: `1 - (embedding
/// <=> $1::vector)` as the similarity score, ordered by distance with an
/// explicit secondary sort key.
pub struct PgVectorStore {
    pool: PgPool,
    embed: QueryEmbedder,
}

impl PgVectorStore {
    pub fn new(pool: PgPool, embed: QueryEmbedder) -> Self {
        Self { pool, embed }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn fetch_by_context_id(
        &self,
        rag_context_id: &str,
        top_k: usize,
    ) -> Result<Vec<RagChunk>, RagError> {
        let rows = sqlx::query_as::<_, (String, String, f32, Option<i32>, Option<String>)>(
            r#"
            SELECT chunk_id, content, relevance, page, section_pointer
            FROM rag_chunks
            WHERE rag_context_id = $1
            ORDER BY relevance DESC, chunk_id ASC
            LIMIT $2
            "#,
        )
        .bind(rag_context_id)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, content, relevance, page, section_pointer)| RagChunk {
                id,
                content,
                relevance,
                page: page.map(|p| p as u32),
                section_pointer,
            })
            .collect())
    }

    async fn search(&self, collection: &str, query: &str, top_k: usize) -> Result<Vec<RagChunk>, RagError> {
        let embedding = Vector::from((self.embed)(query));

        let rows = sqlx::query_as::<_, (String, String, f32, Option<i32>, Option<String>)>(
            r#"
            SELECT
                chunk_id,
                content,
                1 - (embedding <=> $1::vector) AS similarity,
                page,
                section_pointer
            FROM rag_chunks
            WHERE collection = $2
            ORDER BY embedding <=> $1::vector, chunk_id ASC
            LIMIT $3
            "#,
        )
        .bind(&embedding)
        .bind(collection)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, content, relevance, page, section_pointer)| RagChunk {
                id,
                content,
                relevance,
                page: page.map(|p| p as u32),
                section_pointer,
            })
            .collect())
    }
}
