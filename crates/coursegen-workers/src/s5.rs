//! S5 — Structure Generation: expands `analysis_result` into ordered
//! sections and lessons, persists the rows, and enqueues one S6 job per
//! lesson with the course's target language and difficulty inherited.

use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseFsm, CourseTransitions};
use coursegen_llm::{CompletionRequest, ResponseFormat};
use coursegen_queue::{EnqueueOptions, JobQueue};
use coursegen_store::MetadataStore;
use coursegen_types::{CourseStatus, JobPayload, JobType};
use serde::Deserialize;

use crate::dispatch::{StageWorker, WorkerOutcome};
use crate::error::StageError;
use crate::fsm_port::StorePort;
use crate::ports::Completions;

const SYSTEM_PROMPT: &str = "Expand this course's analysis into an ordered course structure. Respond with JSON: {\"sections\": [{\"title\": string, \"description\": string, \"lessons\": [{\"title\": string, \"duration_minutes\": number|null, \"lesson_type\": string}]}]}.";

#[derive(Debug, Deserialize)]
struct GeneratedStructure {
    sections: Vec<GeneratedSection>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSection {
    title: String,
    description: Option<String>,
    lessons: Vec<GeneratedLesson>,
}

#[derive(Debug, Deserialize)]
struct GeneratedLesson {
    title: String,
    duration_minutes: Option<i32>,
    lesson_type: String,
}

pub struct StructureGenerationWorker<S> {
    store: Arc<S>,
    queue: Arc<dyn JobQueue>,
    llm: Arc<dyn Completions>,
}

impl<S> StructureGenerationWorker<S> {
    pub fn new(store: Arc<S>, queue: Arc<dyn JobQueue>, llm: Arc<dyn Completions>) -> Self {
        Self { store, queue, llm }
    }
}

#[async_trait]
impl<S> StageWorker for StructureGenerationWorker<S>
where
    S: MetadataStore + CourseTransitions + Send + Sync + 'static,
{
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let JobPayload::StructureGeneration { course_id } = payload else {
            return Err(StageError::PayloadMismatch);
        };

        let fsm = CourseFsm::new(StorePort(self.store.clone()));
        fsm.transition(course_id, CourseStatus::Structuring, None).await?;

        let course = self.store.get_course(course_id).await?;
        let analysis = course
            .analysis_result
            .clone()
            .ok_or(StageError::PreconditionMissing("analysis_result"))?;

        let user_prompt = format!(
            "Course title: {}\nLanguage: {}\nAnalysis: {}",
            course.title, course.language, analysis
        );
        let mut request = CompletionRequest::new(SYSTEM_PROMPT, user_prompt);
        request.response_format = ResponseFormat::JsonSchema(serde_json::json!({
            "type": "object",
            "properties": {"sections": {"type": "array"}},
        }));

        let response = self.llm.complete_with_escalation(&request).await?;
        let structure: GeneratedStructure =
            serde_json::from_str(&response.text).map_err(|e| StageError::Decoding(e.to_string()))?;

        let mut enqueued = Vec::new();
        for (section_index, section) in structure.sections.iter().enumerate() {
            let section_id = self
                .store
                .insert_section(
                    course_id,
                    &section.title,
                    section.description.as_deref(),
                    section_index as i32 + 1,
                )
                .await?;

            for (lesson_index, lesson) in section.lessons.iter().enumerate() {
                let lesson_id = self
                    .store
                    .insert_lesson(
                        section_id,
                        &lesson.title,
                        lesson_index as i32 + 1,
                        lesson.duration_minutes,
                        &lesson.lesson_type,
                    )
                    .await?;

                self.queue
                    .enqueue(
                        JobPayload::LessonContent { lesson_id, course_id, model_override: None },
                        EnqueueOptions::default(),
                    )
                    .await?;
                enqueued.push(JobType::LessonContent);
            }
        }

        let structure_value = serde_json::to_value(&structure_for_storage(&structure))
            .map_err(|e| StageError::Decoding(e.to_string()))?;
        self.store.update_course_structure(course_id, structure_value).await?;

        Ok(WorkerOutcome { enqueued, note: None })
    }
}

fn structure_for_storage(structure: &GeneratedStructure) -> serde_json::Value {
    serde_json::json!({
        "sections": structure.sections.iter().map(|s| serde_json::json!({
            "title": s.title,
            "description": s.description,
            "lessons": s.lessons.iter().map(|l| serde_json::json!({
                "title": l.title,
                "duration_minutes": l.duration_minutes,
                "lesson_type": l.lesson_type,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursegen_llm::{CompletionResponse, LlmError};
    use coursegen_queue::MemoryJobQueue;
    use coursegen_store::MemoryStore;
    use coursegen_types::Course;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedLlm(Mutex<Option<String>>);

    #[async_trait]
    impl Completions for ScriptedLlm {
        async fn complete_with_escalation(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let text = self.0.lock().unwrap().take().expect("called once");
            Ok(CompletionResponse {
                text,
                tokens_prompt: 200,
                tokens_completion: 400,
                cost_usd: 0.05,
                model_used: "test-model".into(),
                duration_ms: 30,
            })
        }
    }

    fn course_with_analysis(id: Uuid) -> Course {
        Course {
            id,
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Intro to Rust".into(),
            slug: "intro-to-rust".into(),
            status: "active".into(),
            generation_status: "structuring".into(),
            generation_progress: 70,
            generation_metadata: None,
            analysis_result: Some(serde_json::json!({"category": "programming"})),
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
    async fn expands_analysis_into_sections_lessons_and_one_s6_job_per_lesson() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(course_with_analysis(course_id));

        let structure_json = serde_json::json!({
            "sections": [{
                "title": "Ownership",
                "description": "Core memory model",
                "lessons": [
                    {"title": "What is ownership", "duration_minutes": 15, "lesson_type": "video"},
                    {"title": "Borrowing", "duration_minutes": 20, "lesson_type": "video"},
                ],
            }],
        });
        let llm = Arc::new(ScriptedLlm(Mutex::new(Some(structure_json.to_string()))));
        let queue = Arc::new(MemoryJobQueue::new());
        let worker = StructureGenerationWorker::new(store.clone(), queue.clone(), llm);

        let outcome = worker
            .handle(JobPayload::StructureGeneration { course_id })
            .await
            .unwrap();

        assert_eq!(outcome.enqueued, vec![JobType::LessonContent, JobType::LessonContent]);
        assert_eq!(queue.len_waiting(), 2);
        let course = store.get_course(course_id).await.unwrap();
        assert!(course.course_structure.is_some());
    }

    #[tokio::test]
    async fn missing_analysis_result_is_a_dependency_precondition_failure() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        let mut course = course_with_analysis(course_id);
        course.analysis_result = None;
        store.seed_course(course);

        let llm = Arc::new(ScriptedLlm(Mutex::new(None)));
        let queue = Arc::new(MemoryJobQueue::new());
        let worker = StructureGenerationWorker::new(store, queue, llm);

        let err = worker
            .handle(JobPayload::StructureGeneration { course_id })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::PreconditionMissing("analysis_result")));
    }
}
