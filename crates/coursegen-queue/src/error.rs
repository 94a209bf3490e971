use coursegen_types::{ErrorKind, ErrorKindExt};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("job {0} is not reserved by this consumer")]
    NotReserved(Uuid),
    #[cfg(feature = "database")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("queue backend error: {0}")]
    Backend(String),
}

impl ErrorKindExt for QueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            QueueError::NotFound(_) => ErrorKind::StateConflict,
            QueueError::NotReserved(_) => ErrorKind::StateConflict,
            #[cfg(feature = "database")]
            QueueError::Database(_) => ErrorKind::NetTransient,
            QueueError::Backend(_) => ErrorKind::NetTransient,
        }
    }
}
