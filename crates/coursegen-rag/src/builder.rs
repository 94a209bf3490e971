use coursegen_types::{LessonSpec, RagChunk, SectionBreakdown};
use tracing::instrument;

use crate::error::RagError;
use crate::merge::merge_and_rank;
use crate::port::VectorStore;

/// Builds per-section RAG context for a [`LessonSpec`] against a
/// [`VectorStore`] port.
pub struct RagContextBuilder<'a> {
    store: &'a dyn VectorStore,
}

impl<'a> RagContextBuilder<'a> {
    pub fn new(store: &'a dyn VectorStore) -> Self {
        Self { store }
    }

    /// For each section: resolve its `rag_context_id`, optionally run the
    /// lesson's search queries against the section's collection, merge
    /// and rank, and trim to `expected_chunks`. Returns the chunks
    /// aligned one-to-one with `lesson_spec.sections`.
    #[instrument(skip(self, lesson_spec))]
    pub async fn build_for_lesson(
        &self,
        lesson_spec: &LessonSpec,
    ) -> Result<Vec<(String, Vec<RagChunk>)>, RagError> {
        let mut out = Vec::with_capacity(lesson_spec.sections.len());
        for section in &lesson_spec.sections {
            let chunks = self
                .build_for_section(section, &lesson_spec.rag_context.vector_collection, &lesson_spec.rag_context.search_queries)
                .await?;
            out.push((section.section_id.clone(), chunks));
        }
        Ok(out)
    }

    async fn build_for_section(
        &self,
        section: &SectionBreakdown,
        collection: &str,
        search_queries: &[String],
    ) -> Result<Vec<RagChunk>, RagError> {
        let mut collected = Vec::new();

        if let Some(context_id) = &section.rag_context_id {
            collected.extend(
                self.store
                    .fetch_by_context_id(context_id, section.expected_chunks)
                    .await?,
            );
        }

        for query in search_queries {
            collected.extend(self.store.search(collection, query, section.expected_chunks).await?);
        }

        Ok(merge_and_rank(collected, section.expected_chunks))
    }
}
