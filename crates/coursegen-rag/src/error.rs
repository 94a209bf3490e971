use coursegen_types::{ErrorKind, ErrorKindExt};

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("rag context id {0} has no chunks")]
    EmptyContext(String),
    #[cfg(feature = "database")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("vector store error: {0}")]
    Backend(String),
}

impl ErrorKindExt for RagError {
    fn kind(&self) -> ErrorKind {
        match self {
            RagError::EmptyContext(_) => ErrorKind::DependencyMissing,
            #[cfg(feature = "database")]
            RagError::Database(_) => ErrorKind::NetTransient,
            RagError::Backend(_) => ErrorKind::NetTransient,
        }
    }
}
