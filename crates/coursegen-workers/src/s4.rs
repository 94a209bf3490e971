//! S4 — Analysis: two sequential LLM calls (categorization on a cheap
//! model, then guidance on the primary model, fed the categorization as
//! context) producing `analysis_result`. Each call is its own cost-ledger
//! entry so the two phases are separately observable.

use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseFsm, CourseTransitions};
use coursegen_llm::{CompletionRequest, ResponseFormat};
use coursegen_metrics::{MetricsScope, MetricsSink};
use coursegen_queue::{EnqueueOptions, JobQueue};
use coursegen_store::MetadataStore;
use coursegen_types::{CourseStatus, JobPayload, JobType, NodeMetric};
use serde_json::Value;

use crate::dispatch::{StageWorker, WorkerOutcome};
use crate::error::StageError;
use crate::fsm_port::StorePort;
use crate::ports::Completions;

const CATEGORIZATION_MODEL: &str = "openrouter/cheap-categorizer";

const CATEGORIZATION_SYSTEM: &str = "Classify this course's source material by category and dominant topics. Respond with JSON: {\"category\": string, \"topics\": [string]}.";

const GUIDANCE_SYSTEM: &str = "Given the course's category/topics and its source summaries, produce generation guidance. Respond with JSON: {\"topic_analysis\": object, \"generation_guidance\": {\"tone\": string, \"audience\": string, \"depth\": string}, \"document_relevance\": object, \"research_flags\": [string]}.";

pub struct AnalysisWorker<S> {
    store: Arc<S>,
    queue: Arc<dyn JobQueue>,
    llm: Arc<dyn Completions>,
    metrics: Arc<dyn MetricsSink>,
}

impl<S> AnalysisWorker<S> {
    pub fn new(store: Arc<S>, queue: Arc<dyn JobQueue>, llm: Arc<dyn Completions>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { store, queue, llm, metrics }
    }
}

#[async_trait]
impl<S> StageWorker for AnalysisWorker<S>
where
    S: MetadataStore + CourseTransitions + Send + Sync + 'static,
{
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let JobPayload::StructureAnalysis { course_id } = payload else {
            return Err(StageError::PayloadMismatch);
        };

        let fsm = CourseFsm::new(StorePort(self.store.clone()));
        fsm.transition(course_id, CourseStatus::Analyzing, None).await?;

        let course = self.store.get_course(course_id).await?;
        let files = self.store.list_files_for_course(course_id).await?;
        let summaries: Vec<&str> = files
            .iter()
            .filter_map(|f| f.processed_content.as_deref())
            .collect();

        let categorization_user = format!(
            "Course title: {}\nLanguage: {}\nSource summaries:\n{}",
            course.title,
            course.language,
            summaries.join("\n---\n")
        );
        let mut categorization_request = CompletionRequest::new(CATEGORIZATION_SYSTEM, categorization_user);
        categorization_request.model_override = Some(CATEGORIZATION_MODEL.to_string());
        categorization_request.response_format = ResponseFormat::JsonSchema(serde_json::json!({
            "type": "object",
            "properties": {"category": {"type": "string"}, "topics": {"type": "array"}},
        }));

        let categorization_response = self.llm.complete_with_escalation(&categorization_request).await?;
        let categorization: Value = serde_json::from_str(&categorization_response.text)
            .map_err(|e| StageError::Decoding(e.to_string()))?;

        self.metrics
            .record(MetricsScope::Course { course_id }, node_metric("S4_categorization", &categorization_response))
            .await?;

        let guidance_user = format!(
            "Categorization:\n{}\n\nSource summaries:\n{}",
            categorization,
            summaries.join("\n---\n")
        );
        let mut guidance_request = CompletionRequest::new(GUIDANCE_SYSTEM, guidance_user);
        guidance_request.response_format = ResponseFormat::JsonSchema(serde_json::json!({
            "type": "object",
            "properties": {
                "topic_analysis": {"type": "object"},
                "generation_guidance": {"type": "object"},
                "document_relevance": {"type": "object"},
                "research_flags": {"type": "array"},
            },
        }));

        let guidance_response = self.llm.complete_with_escalation(&guidance_request).await?;
        let guidance: Value = serde_json::from_str(&guidance_response.text)
            .map_err(|e| StageError::Decoding(e.to_string()))?;

        self.metrics
            .record(MetricsScope::Course { course_id }, node_metric("S4_guidance", &guidance_response))
            .await?;

        let analysis_result = serde_json::json!({
            "category": categorization.get("category").cloned().unwrap_or(Value::Null),
            "topic_analysis": guidance.get("topic_analysis").cloned().unwrap_or(Value::Null),
            "generation_guidance": guidance.get("generation_guidance").cloned().unwrap_or(Value::Null),
            "document_relevance": guidance.get("document_relevance").cloned().unwrap_or(Value::Null),
            "research_flags": guidance.get("research_flags").cloned().unwrap_or(Value::Array(vec![])),
        });

        self.store.update_analysis_result(course_id, analysis_result).await?;

        self.queue
            .enqueue(JobPayload::StructureGeneration { course_id }, EnqueueOptions::default())
            .await?;

        Ok(WorkerOutcome::done().with_enqueued(JobType::StructureGeneration))
    }
}

fn node_metric(node_name: &str, response: &coursegen_llm::CompletionResponse) -> NodeMetric {
    NodeMetric {
        node_name: node_name.to_string(),
        model: response.model_used.clone(),
        input_tokens: response.tokens_prompt,
        output_tokens: response.tokens_completion,
        cost_usd: response.cost_usd,
        duration_ms: response.duration_ms,
        ok: true,
        error_class: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursegen_llm::{CompletionResponse, LlmError};
    use coursegen_metrics::InMemoryMetricsSink;
    use coursegen_queue::MemoryJobQueue;
    use coursegen_store::MemoryStore;
    use coursegen_types::Course;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Completions for ScriptedLlm {
        async fn complete_with_escalation(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let text = self.responses.lock().unwrap().remove(0);
            Ok(CompletionResponse {
                text,
                tokens_prompt: 100,
                tokens_completion: 50,
                cost_usd: 0.01,
                model_used: "test-model".into(),
                duration_ms: 20,
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
            generation_status: "analyzing".into(),
            generation_progress: 55,
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
    async fn two_phase_analysis_records_two_cost_entries_and_enqueues_s5() {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store.seed_course(seeded_course(course_id));

        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(vec![
                r#"{"category": "programming", "topics": ["ownership"]}"#.to_string(),
                r#"{"topic_analysis": {}, "generation_guidance": {"tone": "friendly"}, "document_relevance": {}, "research_flags": []}"#.to_string(),
            ]),
        });
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());

        let worker = AnalysisWorker::new(store.clone(), queue, llm, metrics.clone());
        let outcome = worker
            .handle(JobPayload::StructureAnalysis { course_id })
            .await
            .unwrap();

        assert_eq!(outcome.enqueued, vec![JobType::StructureGeneration]);
        assert_eq!(metrics.recorded_count(), 2);
        let course = store.get_course(course_id).await.unwrap();
        assert_eq!(course.analysis_result.unwrap()["category"], "programming");
    }
}
