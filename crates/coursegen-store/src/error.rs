use coursegen_types::{ErrorKind, ErrorKindExt};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} {1} not found")]
    NotFound(&'static str, Uuid),
    #[error("conflict writing {0}: {1}")]
    Conflict(&'static str, String),
    #[error("illegal course transition: {0}")]
    IllegalTransition(String),
    #[cfg(feature = "database")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

impl ErrorKindExt for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(..) => ErrorKind::ValidationError,
            StoreError::Conflict(..) => ErrorKind::StateConflict,
            StoreError::IllegalTransition(_) => ErrorKind::StateConflict,
            #[cfg(feature = "database")]
            StoreError::Database(_) => ErrorKind::NetTransient,
            StoreError::RetriesExhausted { .. } => ErrorKind::NetTransient,
        }
    }
}

impl From<StoreError> for coursegen_fsm::FsmError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_, id) => coursegen_fsm::FsmError::NotFound(id),
            other => coursegen_fsm::FsmError::Store(other.to_string()),
        }
    }
}
