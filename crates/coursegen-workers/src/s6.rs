//! S6 — Lesson Content Generation: assembles a `LessonSpec` from the
//! stored lesson/course rows, runs the Stage 6 lesson graph, persists
//! the result, and — since this is the pipeline's last stage — drives
//! the course FSM to `Completed` once every lesson has reached a
//! terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseFsm, CourseTransitions};
use coursegen_lesson_graph::{Completions, GraphLimits, LessonGraphRunner, LessonOutcome, MarkdownLinter};
use coursegen_rag::{RagContextBuilder, VectorStore};
use coursegen_store::MetadataStore;
use coursegen_types::lesson_spec::{Exercise, IntroBlueprint, LessonMetadata, RagContextDescriptor};
use coursegen_types::{
    CourseStatus, JobPayload, LearningObjective, LessonSpec, RoutingConfig, SectionBreakdown,
};
use uuid::Uuid;

use crate::dispatch::{StageWorker, WorkerOutcome};
use crate::error::StageError;
use crate::fsm_port::StorePort;

pub struct LessonContentWorker<'a, S> {
    store: Arc<S>,
    vector_store: &'a dyn VectorStore,
    llm: &'a dyn Completions,
    linter: &'a dyn MarkdownLinter,
    limits: GraphLimits,
    routing: RoutingConfig,
    max_concurrency: usize,
    adjacent_section_gap: i64,
}

impl<'a, S> LessonContentWorker<'a, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        vector_store: &'a dyn VectorStore,
        llm: &'a dyn Completions,
        linter: &'a dyn MarkdownLinter,
        limits: GraphLimits,
        routing: RoutingConfig,
        max_concurrency: usize,
        adjacent_section_gap: i64,
    ) -> Self {
        Self {
            store,
            vector_store,
            llm,
            linter,
            limits,
            routing,
            max_concurrency,
            adjacent_section_gap,
        }
    }
}

#[async_trait]
impl<'a, S> StageWorker for LessonContentWorker<'a, S>
where
    S: MetadataStore + CourseTransitions + Send + Sync + 'static,
{
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let JobPayload::LessonContent { lesson_id, course_id, model_override: _ } = payload else {
            return Err(StageError::PayloadMismatch);
        };

        let fsm = CourseFsm::new(StorePort(self.store.clone()));
        fsm.transition(course_id, CourseStatus::GeneratingLessons, None).await?;

        let course = self.store.get_course(course_id).await?;
        let lessons = self.store.list_lessons_for_course(course_id).await?;
        let lesson = lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .ok_or(StageError::PreconditionMissing("lesson row"))?;

        let lesson_spec = assemble_lesson_spec(lesson, &course, course_id);

        let rag_pairs = RagContextBuilder::new(self.vector_store)
            .build_for_lesson(&lesson_spec)
            .await?;
        let rag_chunks: HashMap<String, _> = rag_pairs.into_iter().collect();

        let runner = LessonGraphRunner::new(
            self.llm,
            self.linter,
            self.limits,
            self.routing,
            self.max_concurrency,
            self.adjacent_section_gap,
        );
        let outcome = runner.run(&lesson_spec, &rag_chunks).await?;

        let status = match outcome.outcome {
            LessonOutcome::Completed => "completed",
            LessonOutcome::ReviewRequired => "review_required",
        };

        let content_json = serde_json::json!({
            "intro": outcome.content.intro,
            "sections": outcome.content.sections.iter()
                .map(|(id, body)| serde_json::json!({"id": id, "body": body}))
                .collect::<Vec<_>>(),
            "exercises": outcome.content.exercises,
        });
        let metadata_json = serde_json::json!({
            "quality_score": outcome.quality_score,
            "metrics": outcome.metrics,
        });

        self.store
            .upsert_lesson_content(lesson_id, course_id, content_json, metadata_json, status)
            .await?;
        self.store.update_lesson_status(lesson_id, status).await?;

        let remaining = self.store.list_lessons_for_course(course_id).await?;
        if remaining.iter().all(|l| is_terminal_lesson_status(&l.status)) {
            fsm.transition(course_id, CourseStatus::Completed, None).await?;
        }

        Ok(WorkerOutcome::done().with_note(format!("lesson {lesson_id} -> {status}")))
    }
}

fn is_terminal_lesson_status(status: &str) -> bool {
    matches!(status, "completed" | "failed" | "review_required")
}

/// Builds the [`LessonSpec`] S6 needs from what S5 actually persists.
/// `lesson.metadata` may carry a richer breakdown (sections, objectives,
/// exercises) when S5 wrote one; lessons from a minimal S5 run fall back
/// to a single default section so the graph still has something to work
/// from rather than failing outright.
fn assemble_lesson_spec(
    lesson: &coursegen_types::Lesson,
    course: &coursegen_types::Course,
    course_id: Uuid,
) -> LessonSpec {
    let meta = lesson.metadata.as_ref();

    let objectives: Vec<LearningObjective> = meta
        .and_then(|m| m.get("objectives"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let sections: Vec<SectionBreakdown> = meta
        .and_then(|m| m.get("sections"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| {
            vec![SectionBreakdown {
                section_id: "sec_1".to_string(),
                archetype: "concept".to_string(),
                depth: "intro".to_string(),
                required_keywords: vec![],
                prohibited_keywords: vec![],
                key_points: vec![],
                rag_context_id: None,
                expected_chunks: 5,
            }]
        });

    let exercises: Vec<Exercise> = meta
        .and_then(|m| m.get("exercises"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| {
            vec![Exercise {
                prompt: format!("Practice what you learned in \"{}\".", lesson.title),
                exercise_type: "reflection".to_string(),
            }]
        });

    LessonSpec {
        lesson_id: lesson.id,
        title: lesson.title.clone(),
        metadata: LessonMetadata {
            audience: "general".to_string(),
            tone: "clear and direct".to_string(),
            compliance_level: None,
            archetype: lesson.lesson_type.clone(),
        },
        objectives,
        intro: IntroBlueprint {
            hook: format!("Why \"{}\" matters", lesson.title),
            context: course.title.clone(),
        },
        sections,
        exercises,
        rag_context: RagContextDescriptor {
            vector_collection: format!("course-{course_id}"),
            search_queries: vec![lesson.title.clone()],
        },
        target_language: course.language.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursegen_lesson_graph::DefaultLinter;
    use coursegen_llm::{CompletionRequest, CompletionResponse, LlmError};
    use coursegen_rag::MemoryVectorStore;
    use coursegen_store::MemoryStore;
    use coursegen_types::{Course, Lesson};

    struct ScriptedLlm;

    #[async_trait]
    impl Completions for ScriptedLlm {
        async fn complete_with_escalation(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                text: "## sec_1\n\nBody text about the lesson.\n".to_string(),
                tokens_prompt: 50,
                tokens_completion: 80,
                cost_usd: 0.01,
                model_used: "test-model".into(),
                duration_ms: 10,
            })
        }
    }

    fn seeded_course(id: Uuid) -> Course {
        Course {
            id,
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Intro to Rust".into(),
            slug: "intro-to-rust".into(),
            status: "active".into(),
            generation_status: "generating_lessons".into(),
            generation_progress: 85,
            generation_metadata: None,
            analysis_result: None,
            course_structure: None,
            language: "en".into(),
            style: None,
            share_token: None,
            is_published: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn runs_the_lesson_graph_and_completes_the_course_when_it_was_the_only_lesson() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(seeded_course(course_id));

        let section_id = store
            .insert_section(course_id, "Ownership", None, 1)
            .await
            .unwrap();
        let lesson_id = store
            .insert_lesson(section_id, "What is ownership", 1, Some(10), "video")
            .await
            .unwrap();

        let vector_store = MemoryVectorStore::new();
        let llm = ScriptedLlm;
        let linter = DefaultLinter;

        let worker = LessonContentWorker::new(
            store.clone(),
            &vector_store,
            &llm,
            &linter,
            GraphLimits::default(),
            RoutingConfig {
                token_budget: 50_000,
                max_patcher_calls: 5,
                prefer_surgical: true,
                token_costs: coursegen_types::refinement::TokenCosts {
                    patcher: coursegen_types::refinement::TokenCostRange { min: 100, max: 500 },
                    section_expander: coursegen_types::refinement::TokenCostRange { min: 200, max: 800 },
                    full_regenerate: coursegen_types::refinement::TokenCostRange { min: 1000, max: 4000 },
                },
            },
            3,
            1,
        );

        worker
            .handle(JobPayload::LessonContent { lesson_id, course_id, model_override: None })
            .await
            .unwrap();

        let content = store.get_lesson_content(lesson_id).await.unwrap().unwrap();
        assert_eq!(content.status, "completed");
        let course = store.get_course(course_id).await.unwrap();
        assert_eq!(course.generation_status(), CourseStatus::Completed);
    }

    #[test]
    fn default_section_is_used_when_no_metadata_breakdown_exists() {
        let course = seeded_course(Uuid::new_v4());
        let lesson = Lesson {
            id: Uuid::new_v4(),
            section_id: Uuid::new_v4(),
            title: "Borrowing".into(),
            order_index: 1,
            duration_minutes: Some(10),
            lesson_type: "video".into(),
            status: "pending".into(),
            objectives: None,
            metadata: None,
        };
        let spec = assemble_lesson_spec(&lesson, &course, course.id);
        assert_eq!(spec.sections.len(), 1);
        assert_eq!(spec.sections[0].section_id, "sec_1");
    }
}
