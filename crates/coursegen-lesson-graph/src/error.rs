use coursegen_llm::LlmError;
use coursegen_types::{ErrorKind, ErrorKindExt};

#[derive(Debug, thiserror::Error)]
pub enum LessonGraphError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("could not parse lesson markdown: {0}")]
    MalformedMarkdown(String),
    #[error("refinement token budget exceeded: used {used} > budget {budget}")]
    BudgetExceeded { used: u32, budget: u32 },
    #[error("section {0} was targeted for refinement but is locked")]
    SectionLocked(String),
}

impl ErrorKindExt for LessonGraphError {
    fn kind(&self) -> ErrorKind {
        match self {
            LessonGraphError::Llm(e) => e.kind(),
            LessonGraphError::MalformedMarkdown(_) => ErrorKind::DecodingError,
            LessonGraphError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            LessonGraphError::SectionLocked(_) => ErrorKind::ValidationError,
        }
    }
}
