use coursegen_fsm::FsmError;
use coursegen_lesson_graph::LessonGraphError;
use coursegen_llm::LlmError;
use coursegen_metrics::MetricsError;
use coursegen_queue::QueueError;
use coursegen_rag::RagError;
use coursegen_store::StoreError;
use coursegen_types::{ErrorKind, ErrorKindExt};

/// The one error type every stage handler returns. Each variant either
/// wraps a collaborator's own error (and defers to its `kind()`) or
/// names a stage-local validation failure that has no other home.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Fsm(#[from] FsmError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Rag(#[from] RagError),
    #[error(transparent)]
    LessonGraph(#[from] LessonGraphError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("document parsing failed: {0}")]
    DocumentParsing(String),
    #[error("could not decode LLM output as JSON: {0}")]
    Decoding(String),
    #[error("chunk indexing failed: {0}")]
    ChunkIndexing(String),
    #[error("{0} exceeds the {1} tier limit")]
    TierLimitExceeded(&'static str, &'static str),
    #[error("organization storage quota exceeded")]
    StorageQuotaExceeded,
    #[error("every eligible file failed summarization")]
    AllFilesFailed,
    #[error("job payload did not match the job type it was dispatched for")]
    PayloadMismatch,
    #[error("no stage worker registered for {0}")]
    NoHandlerRegistered(coursegen_types::JobType),
    #[error("{0} is required by this stage but is missing on the course")]
    PreconditionMissing(&'static str),
}

impl ErrorKindExt for StageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StageError::Store(e) => e.kind(),
            StageError::Queue(e) => e.kind(),
            StageError::Fsm(e) => e.kind(),
            StageError::Llm(e) => e.kind(),
            StageError::Rag(e) => e.kind(),
            StageError::LessonGraph(e) => e.kind(),
            StageError::Metrics(e) => e.kind(),
            StageError::DocumentParsing(_) => ErrorKind::DependencyMissing,
            StageError::Decoding(_) => ErrorKind::DecodingError,
            StageError::ChunkIndexing(_) => ErrorKind::DependencyMissing,
            StageError::TierLimitExceeded(..) => ErrorKind::ValidationError,
            StageError::StorageQuotaExceeded => ErrorKind::BudgetExceeded,
            StageError::AllFilesFailed => ErrorKind::DependencyMissing,
            StageError::PayloadMismatch => ErrorKind::ValidationError,
            StageError::NoHandlerRegistered(_) => ErrorKind::ValidationError,
            StageError::PreconditionMissing(_) => ErrorKind::DependencyMissing,
        }
    }
}
