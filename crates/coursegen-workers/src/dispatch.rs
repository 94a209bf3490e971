//! Stage dispatch: one `StageWorker` per job type, looked up from a
//! small registry — the same register/lookup shape as `DomainRegistry`
//! (`register_handler` + `HashMap<String, Box<dyn DomainHandler>>`),
//! keyed on `JobType` instead of a DSL domain name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coursegen_types::{JobPayload, JobType};

use crate::error::StageError;

/// What a stage reports back to the worker pool after a successful
/// `handle()`. Per-item partial failures (a single file, a single
/// lesson) are absorbed inside the worker itself; only a fatal condition
/// for the whole job surfaces as `Err(StageError)`.
#[derive(Debug, Clone, Default)]
pub struct WorkerOutcome {
    pub enqueued: Vec<JobType>,
    pub note: Option<String>,
}

impl WorkerOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_enqueued(mut self, job_type: JobType) -> Self {
        self.enqueued.push(job_type);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[async_trait]
pub trait StageWorker: Send + Sync {
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError>;
}

/// Registry of one worker per `JobType`. Built once at startup from the
/// CLI's wiring of concrete adapters, then shared read-only across the
/// worker pool's tasks.
#[derive(Default)]
pub struct StageRegistry {
    handlers: HashMap<JobType, Arc<dyn StageWorker>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn StageWorker>) {
        self.handlers.insert(job_type, handler);
    }

    pub async fn dispatch(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let job_type = payload.job_type();
        match self.handlers.get(&job_type) {
            Some(handler) => handler.handle(payload).await,
            None => Err(StageError::NoHandlerRegistered(job_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct EchoWorker;

    #[async_trait]
    impl StageWorker for EchoWorker {
        async fn handle(&self, _payload: JobPayload) -> Result<WorkerOutcome, StageError> {
            Ok(WorkerOutcome::done().with_note("echoed"))
        }
    }

    #[tokio::test]
    async fn dispatch_routes_by_the_payloads_own_job_type() {
        let mut registry = StageRegistry::new();
        registry.register(JobType::Summarization, Arc::new(EchoWorker));

        let outcome = registry
            .dispatch(JobPayload::Summarization {
                course_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.note.as_deref(), Some("echoed"));
    }

    #[tokio::test]
    async fn dispatch_fails_fast_when_no_handler_is_registered() {
        let registry = StageRegistry::new();
        let err = registry
            .dispatch(JobPayload::Summarization {
                course_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::NoHandlerRegistered(JobType::Summarization)));
    }
}
