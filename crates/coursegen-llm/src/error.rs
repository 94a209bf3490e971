use coursegen_types::{ErrorKind, ErrorKindExt};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("network error calling LLM gateway: {0}")]
    Network(#[from] reqwest::Error),
    #[error("LLM gateway returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("could not decode LLM response: {0}")]
    Decoding(String),
    #[error("request would exceed the per-call token cap ({requested} > {cap})")]
    TokenCapExceeded { requested: u32, cap: u32 },
    #[error("LLM call exceeded its deadline after {0}ms")]
    Timeout(u64),
    #[error("no more models to escalate to after {0}")]
    EscalationExhausted(String),
}

impl ErrorKindExt for LlmError {
    fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Network(_) => ErrorKind::NetTransient,
            LlmError::Upstream { status, .. } if *status == 429 => ErrorKind::NetTransient,
            LlmError::Upstream { .. } => ErrorKind::UpstreamError,
            LlmError::Decoding(_) => ErrorKind::DecodingError,
            LlmError::TokenCapExceeded { .. } => ErrorKind::BudgetExceeded,
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::EscalationExhausted(_) => ErrorKind::UpstreamError,
        }
    }
}
