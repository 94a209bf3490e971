use async_trait::async_trait;
use coursegen_llm::{CompletionRequest, CompletionResponse, GatewayClient, LlmError};

/// The single LLM operation every Stage 6 node needs. Kept as a trait so
/// tests can swap in a scripted fake instead of a live `GatewayClient`,
/// mirroring the ports used for the queue, store, and vector search.
#[async_trait]
pub trait Completions: Send + Sync {
    async fn complete_with_escalation(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError>;
}

#[async_trait]
impl Completions for GatewayClient {
    async fn complete_with_escalation(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        GatewayClient::complete_with_escalation(self, request).await
    }
}
