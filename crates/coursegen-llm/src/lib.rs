//! LLM Gateway Client: a typed wrapper around an external
//! OpenRouter-style chat-completion HTTP endpoint, with a per-call model
//! escalation ladder, a token budget cap, and a cost-ledger hook.
//!
//! Grounded in the same shape as a pair of per-provider LLM clients in the
//! wider codebase this grew out of (one `reqwest::Client`, a
//! `from_env`/`with_model` constructor pair, per-call JSON parsing via
//! locally-scoped structs) but generalized to a single HTTP endpoint that
//! takes a model id per request, since this gateway is a single
//! aggregator rather than one client per vendor.

mod error;

pub use error::LlmError;

use std::env;
use std::time::{Duration, Instant};

use coursegen_types::ErrorKindExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// How the caller wants the response shaped. `JsonSchema` appends a
/// `response_format` field to the request; free markdown relies only on
/// the prompt itself, following the Anthropic-client pattern of folding
/// a "respond with valid JSON only" instruction into the prompt when the
/// provider has no native structured-output mode.
#[derive(Debug, Clone)]
pub enum ResponseFormat {
    Markdown,
    JsonSchema(Value),
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Per-call override; if absent, the first rung of the escalation
    /// ladder is used.
    pub model_override: Option<String>,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
    pub deadline: Duration,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model_override: None,
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 4096,
            response_format: ResponseFormat::Markdown,
            deadline: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub tokens_prompt: u32,
    pub tokens_completion: u32,
    pub cost_usd: f64,
    pub model_used: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub prompt_per_1k_usd: f64,
    pub completion_per_1k_usd: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            prompt_per_1k_usd: 0.003,
            completion_per_1k_usd: 0.015,
        }
    }
}

/// A typed client for a single chat-completion HTTP gateway. One client
/// per process; `reqwest::Client` pools its own connections, satisfying
/// the per-process connection pooling note in the concurrency model.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    escalation_ladder: Vec<String>,
    token_cap: u32,
    pricing: ModelPricing,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            escalation_ladder: vec!["openrouter/auto".to_string()],
            token_cap: 32_000,
            pricing: ModelPricing::default(),
        }
    }

    /// Reads `LLM_API_KEY` (required) and `LLM_BASE_URL` (optional,
    /// defaulting to the system-wide gateway).
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("LLM_API_KEY").map_err(|_| {
            LlmError::Decoding("LLM_API_KEY is not set".to_string())
        })?;
        let base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
        Ok(Self::new(base_url, api_key))
    }

    /// Primary → fallback → emergency, in escalation order.
    pub fn with_escalation_ladder(mut self, ladder: Vec<String>) -> Self {
        self.escalation_ladder = ladder;
        self
    }

    pub fn with_token_cap(mut self, cap: u32) -> Self {
        self.token_cap = cap;
        self
    }

    pub fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// One model, at most one local retry with exponential backoff.
    /// Further escalation across the ladder is the caller's decision —
    /// see [`Self::complete_with_escalation`].
    pub async fn complete(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        if request.max_tokens > self.token_cap {
            return Err(LlmError::TokenCapExceeded {
                requested: request.max_tokens,
                cap: self.token_cap,
            });
        }

        match self.call_once(model, request).await {
            Ok(response) => Ok(response),
            Err(err) if err.kind().is_locally_retryable() => {
                warn!(model, error = %err, "LLM call failed, retrying once");
                tokio::time::sleep(Duration::from_millis(500)).await;
                self.call_once(model, request).await
            }
            Err(err) => Err(err),
        }
    }

    /// Walks the escalation ladder (or a single model if `model_override`
    /// is set) until one rung succeeds or the ladder is exhausted.
    pub async fn complete_with_escalation(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let ladder: Vec<&str> = match &request.model_override {
            Some(m) => vec![m.as_str()],
            None => self.escalation_ladder.iter().map(String::as_str).collect(),
        };

        let mut last_err = None;
        for model in &ladder {
            match self.complete(model, request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.kind().is_locally_retryable() || matches!(err, LlmError::Decoding(_)) => {
                    warn!(model, error = %err, "escalating to next model tier");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            LlmError::EscalationExhausted("empty escalation ladder".to_string())
        }))
    }

    async fn call_once(
        &self,
        model: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let started = Instant::now();

        let mut body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system_prompt_for(request)},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let ResponseFormat::JsonSchema(schema) = &request.response_format {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": schema,
            });
        }

        let send = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(request.deadline, send)
            .await
            .map_err(|_| LlmError::Timeout(request.deadline.as_millis() as u64))??;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decoding(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Decoding("empty choices array".to_string()))?;

        let tokens_prompt = parsed.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0);
        let tokens_completion = parsed.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0);
        let cost_usd = (tokens_prompt as f64 / 1000.0) * self.pricing.prompt_per_1k_usd
            + (tokens_completion as f64 / 1000.0) * self.pricing.completion_per_1k_usd;

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(model, tokens_prompt, tokens_completion, duration_ms, "LLM call completed");

        Ok(CompletionResponse {
            text: choice.message.content,
            tokens_prompt,
            tokens_completion,
            cost_usd,
            model_used: parsed.model.unwrap_or_else(|| model.to_string()),
            duration_ms,
        })
    }
}

fn system_prompt_for(request: &CompletionRequest) -> String {
    match &request.response_format {
        ResponseFormat::Markdown => request.system.clone(),
        ResponseFormat::JsonSchema(_) => format!(
            "{}\n\nRespond with valid JSON only, matching the requested schema. Do not include markdown code fences.",
            request.system
        ),
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
