use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bloom's taxonomy level attached to a learning objective. Validated
/// against (not produced by) this pipeline — the Bloom taxonomy validator
/// itself is an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningObjective {
    pub statement: String,
    pub bloom_level: BloomLevel,
}

/// One entry in `LessonSpec.sections`: the structural contract for a
/// single `##` section of the generated lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionBreakdown {
    /// Stable id; either `sec_<n>` for numbered sections, or a named id
    /// such as `sec_introduction` for structurally fixed ones.
    pub section_id: String,
    pub archetype: String,
    pub depth: String,
    pub required_keywords: Vec<String>,
    pub prohibited_keywords: Vec<String>,
    pub key_points: Vec<String>,
    pub rag_context_id: Option<String>,
    /// How many RAG chunks the builder should trim this section's
    /// retrieval to.
    pub expected_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntroBlueprint {
    pub hook: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub prompt: String,
    pub exercise_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonMetadata {
    pub audience: String,
    pub tone: String,
    pub compliance_level: Option<String>,
    pub archetype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagContextDescriptor {
    pub vector_collection: String,
    pub search_queries: Vec<String>,
}

/// Immutable input contract to S6 / the Stage 6 lesson graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonSpec {
    pub lesson_id: Uuid,
    pub title: String,
    pub metadata: LessonMetadata,
    pub objectives: Vec<LearningObjective>,
    pub intro: IntroBlueprint,
    pub sections: Vec<SectionBreakdown>,
    pub exercises: Vec<Exercise>,
    pub rag_context: RagContextDescriptor,
    pub target_language: String,
}

impl LessonSpec {
    pub fn section(&self, section_id: &str) -> Option<&SectionBreakdown> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }
}
