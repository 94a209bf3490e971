//! S3 — Summarization: produces a compact `processed_content` for every
//! file that made it through S2. A single file's summarization failing
//! is non-fatal; the job only fails when every eligible file does.

use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseFsm, CourseTransitions};
use coursegen_llm::CompletionRequest;
use coursegen_queue::{EnqueueOptions, JobQueue};
use coursegen_store::MetadataStore;
use coursegen_types::{CourseStatus, JobPayload, JobType};
use tracing::warn;

use crate::dispatch::{StageWorker, WorkerOutcome};
use crate::error::StageError;
use crate::fsm_port::StorePort;
use crate::ports::Completions;

const SYSTEM_PROMPT: &str = "You are an instructional designer. Summarize the supplied document into a compact brief an author can use to plan a course, preserving every concrete fact and figure.";

pub struct SummarizationWorker<S> {
    store: Arc<S>,
    queue: Arc<dyn JobQueue>,
    llm: Arc<dyn Completions>,
}

impl<S> SummarizationWorker<S> {
    pub fn new(store: Arc<S>, queue: Arc<dyn JobQueue>, llm: Arc<dyn Completions>) -> Self {
        Self { store, queue, llm }
    }
}

#[async_trait]
impl<S> StageWorker for SummarizationWorker<S>
where
    S: MetadataStore + CourseTransitions + Send + Sync + 'static,
{
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let JobPayload::Summarization { course_id } = payload else {
            return Err(StageError::PayloadMismatch);
        };

        let fsm = CourseFsm::new(StorePort(self.store.clone()));
        fsm.transition(course_id, CourseStatus::Summarizing, None).await?;

        let files = self.store.list_files_for_course(course_id).await?;
        let eligible: Vec<_> = files
            .into_iter()
            .filter(|f| f.eligible_for_summarization() && f.vector_status().is_usable())
            .collect();

        // Zero eligible files (every upload failed S2) is treated the same
        // as every eligible file failing summarization: there is nothing
        // for S4 to analyze, and the course cannot make progress.
        if eligible.is_empty() {
            return Err(StageError::AllFilesFailed);
        }

        let mut succeeded = 0usize;
        for file in &eligible {
            let request = CompletionRequest::new(
                SYSTEM_PROMPT,
                file.markdown_content.clone().unwrap_or_default(),
            );
            match self.llm.complete_with_escalation(&request).await {
                Ok(response) => {
                    self.store.update_processed_content(file.id, &response.text).await?;
                    succeeded += 1;
                }
                Err(e) => {
                    warn!(file_id = %file.id, error = %e, "S3 summarization failed for file");
                }
            }
        }

        if succeeded == 0 {
            return Err(StageError::AllFilesFailed);
        }

        self.queue
            .enqueue(JobPayload::StructureAnalysis { course_id }, EnqueueOptions::default())
            .await?;

        Ok(WorkerOutcome::done()
            .with_note(format!("{succeeded}/{} files summarized", eligible.len()))
            .with_enqueued(JobType::StructureAnalysis))
    }
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

    fn parsed_course(id: Uuid) -> Course {
        Course {
            id,
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Intro to Rust".into(),
            slug: "intro-to-rust".into(),
            status: "active".into(),
            generation_status: "parsing".into(),
            generation_progress: 30,
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

    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, ()>>>,
    }

    #[async_trait]
    impl Completions for ScriptedLlm {
        async fn complete_with_escalation(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            match self.responses.lock().unwrap().remove(0) {
                Ok(text) => Ok(CompletionResponse {
                    text,
                    tokens_prompt: 10,
                    tokens_completion: 10,
                    cost_usd: 0.001,
                    model_used: "test-model".into(),
                    duration_ms: 5,
                }),
                Err(()) => Err(LlmError::Upstream { status: 500, body: "boom".into() }),
            }
        }
    }

    async fn seeded_file(store: &MemoryStore, course_id: Uuid, markdown: Option<&str>) -> Uuid {
        let id = store
            .insert_file(course_id, Uuid::new_v4(), "f.pdf", "application/pdf", 10, "s3://x")
            .await
            .unwrap();
        if let Some(md) = markdown {
            store.update_markdown_content(id, md).await.unwrap();
            store
                .update_vector_status(id, coursegen_types::VectorStatus::Ready)
                .await
                .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn summarizes_every_eligible_file_and_enqueues_s4() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsed_course(course_id));
        seeded_file(&store, course_id, Some("doc one")).await;
        seeded_file(&store, course_id, Some("doc two")).await;
        seeded_file(&store, course_id, None).await; // failed S2, never eligible

        let queue = Arc::new(MemoryJobQueue::new());
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![Ok("summary one".into()), Ok("summary two".into())]),
        });
        let worker = SummarizationWorker::new(store.clone(), queue.clone(), llm);
        let outcome = worker.handle(JobPayload::Summarization { course_id }).await.unwrap();
        assert!(outcome.note.unwrap().starts_with("2/2"));
        assert_eq!(outcome.enqueued, vec![JobType::StructureAnalysis]);
        assert_eq!(queue.len_waiting(), 1);
        let course = store.get_course(course_id).await.unwrap();
        assert_eq!(course.generation_status(), CourseStatus::Summarizing);
    }

    #[tokio::test]
    async fn a_single_file_failing_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsed_course(course_id));
        seeded_file(&store, course_id, Some("doc one")).await;
        seeded_file(&store, course_id, Some("doc two")).await;

        let queue = Arc::new(MemoryJobQueue::new());
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![Ok("ok".into()), Err(())]),
        });
        let worker = SummarizationWorker::new(store, queue, llm);
        let outcome = worker.handle(JobPayload::Summarization { course_id }).await.unwrap();
        assert!(outcome.note.unwrap().starts_with("1/2"));
    }

    #[tokio::test]
    async fn every_eligible_file_failing_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsed_course(course_id));
        seeded_file(&store, course_id, Some("doc one")).await;

        let queue = Arc::new(MemoryJobQueue::new());
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![Err(())]),
        });
        let worker = SummarizationWorker::new(store, queue, llm);
        let err = worker
            .handle(JobPayload::Summarization { course_id })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::AllFilesFailed));
    }

    #[tokio::test]
    async fn no_eligible_files_at_all_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(parsed_course(course_id));
        seeded_file(&store, course_id, None).await;

        let queue = Arc::new(MemoryJobQueue::new());
        let llm = Arc::new(ScriptedLlm { responses: Mutex::new(vec![]) });
        let worker = SummarizationWorker::new(store, queue, llm);
        let err = worker
            .handle(JobPayload::Summarization { course_id })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::AllFilesFailed));
    }
}
