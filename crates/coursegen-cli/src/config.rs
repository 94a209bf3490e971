//! Typed configuration loaded from the environment, per the
//! driver-script surface: LLM credentials, store/queue/vector DSNs,
//! retry and refinement-loop tuning.

use std::time::Duration;

use clap::Parser;
use coursegen_llm::ModelPricing;
use coursegen_types::refinement::{RoutingConfig, TokenCostRange, TokenCosts};

#[derive(Parser, Debug)]
#[command(name = "coursegen")]
#[command(author, version)]
#[command(about = "Drives a single course through S1-S6 and reports cost/quality")]
pub struct Cli {
    #[command(flatten)]
    pub config: AppConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Enqueue DocumentUpload jobs for the given files, run the worker
    /// pool to completion (or timeout), and print a JSON report.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub course_id: uuid::Uuid,
    #[arg(long)]
    pub organization_id: uuid::Uuid,
    #[arg(long)]
    pub user_id: uuid::Uuid,

    /// One per document to seed the course with; repeatable.
    #[arg(long = "file", required = true)]
    pub files: Vec<std::path::PathBuf>,

    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    #[arg(long, default_value_t = 900)]
    pub timeout_secs: u64,

    #[arg(long, default_value_t = 2)]
    pub poll_interval_secs: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AppConfig {
    /// OpenRouter-compatible chat-completion API key.
    #[arg(long, env = "LLM_API_KEY")]
    pub llm_api_key: String,

    #[arg(long, env = "LLM_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub llm_base_url: String,

    /// Primary -> fallback -> emergency, comma-separated.
    #[arg(long, env = "LLM_ESCALATION_LADDER", default_value = "openrouter/auto", value_delimiter = ',')]
    pub llm_escalation_ladder: Vec<String>,

    #[arg(long, env = "LLM_TOKEN_CAP", default_value_t = 32_000)]
    pub llm_token_cap: u32,

    /// Postgres DSN for the metadata store (courses, files, sections,
    /// lessons, job_status).
    #[arg(long, env = "METADATA_URL")]
    pub metadata_url: String,

    /// Defaults to `METADATA_URL` — the queue lives in the same database
    /// unless the deployment splits it out.
    #[arg(long, env = "QUEUE_URL")]
    pub queue_url: Option<String>,

    /// Defaults to `METADATA_URL` — same note as `QUEUE_URL`.
    #[arg(long, env = "VECTOR_URL")]
    pub vector_url: Option<String>,

    /// Document parsing/OCR collaborator's HTTP base URL.
    #[arg(long, env = "DOCUMENT_PARSER_URL")]
    pub document_parser_url: String,

    /// Chunk-embedding/indexing collaborator's HTTP base URL.
    #[arg(long, env = "CHUNK_INDEXER_URL")]
    pub chunk_indexer_url: String,

    #[arg(long, env = "MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long, env = "REFINEMENT_MAX_ITERATIONS", default_value_t = 2)]
    pub refinement_max_iterations: u32,

    #[arg(long, env = "REFINEMENT_MAX_CONCURRENT_PATCHERS", default_value_t = 3)]
    pub refinement_max_concurrent_patchers: usize,

    #[arg(long, env = "REFINEMENT_ADJACENT_SECTION_GAP", default_value_t = 1)]
    pub refinement_adjacent_section_gap: i64,

    #[arg(long, env = "REFINEMENT_TOKEN_BUDGET", default_value_t = 50_000)]
    pub refinement_token_budget: u32,

    #[arg(long, env = "REFINEMENT_MAX_PATCHER_CALLS", default_value_t = 5)]
    pub refinement_max_patcher_calls: u32,

    #[arg(long, env = "REFINEMENT_TOKEN_COST_PATCHER_MIN", default_value_t = 100)]
    pub token_cost_patcher_min: u32,
    #[arg(long, env = "REFINEMENT_TOKEN_COST_PATCHER_MAX", default_value_t = 500)]
    pub token_cost_patcher_max: u32,
    #[arg(long, env = "REFINEMENT_TOKEN_COST_SECTION_EXPANDER_MIN", default_value_t = 200)]
    pub token_cost_section_expander_min: u32,
    #[arg(long, env = "REFINEMENT_TOKEN_COST_SECTION_EXPANDER_MAX", default_value_t = 800)]
    pub token_cost_section_expander_max: u32,
    #[arg(long, env = "REFINEMENT_TOKEN_COST_FULL_REGENERATE_MIN", default_value_t = 1_000)]
    pub token_cost_full_regenerate_min: u32,
    #[arg(long, env = "REFINEMENT_TOKEN_COST_FULL_REGENERATE_MAX", default_value_t = 4_000)]
    pub token_cost_full_regenerate_max: u32,
}

impl AppConfig {
    pub fn queue_url(&self) -> &str {
        self.queue_url.as_deref().unwrap_or(&self.metadata_url)
    }

    pub fn vector_url(&self) -> &str {
        self.vector_url.as_deref().unwrap_or(&self.metadata_url)
    }

    pub fn model_pricing(&self) -> ModelPricing {
        ModelPricing::default()
    }

    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            token_budget: self.refinement_token_budget,
            max_patcher_calls: self.refinement_max_patcher_calls,
            prefer_surgical: true,
            token_costs: TokenCosts {
                patcher: TokenCostRange {
                    min: self.token_cost_patcher_min,
                    max: self.token_cost_patcher_max,
                },
                section_expander: TokenCostRange {
                    min: self.token_cost_section_expander_min,
                    max: self.token_cost_section_expander_max,
                },
                full_regenerate: TokenCostRange {
                    min: self.token_cost_full_regenerate_min,
                    max: self.token_cost_full_regenerate_max,
                },
            },
        }
    }

    pub fn timeout(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AppConfig {
        AppConfig {
            llm_api_key: "key".into(),
            llm_base_url: "https://openrouter.ai/api/v1".into(),
            llm_escalation_ladder: vec!["openrouter/auto".into()],
            llm_token_cap: 32_000,
            metadata_url: "postgres://localhost/meta".into(),
            queue_url: None,
            vector_url: None,
            document_parser_url: "http://localhost:9001".into(),
            chunk_indexer_url: "http://localhost:9002".into(),
            max_retries: 5,
            refinement_max_iterations: 2,
            refinement_max_concurrent_patchers: 3,
            refinement_adjacent_section_gap: 1,
            refinement_token_budget: 50_000,
            refinement_max_patcher_calls: 5,
            token_cost_patcher_min: 100,
            token_cost_patcher_max: 500,
            token_cost_section_expander_min: 200,
            token_cost_section_expander_max: 800,
            token_cost_full_regenerate_min: 1_000,
            token_cost_full_regenerate_max: 4_000,
        }
    }

    #[test]
    fn queue_and_vector_url_default_to_metadata_url() {
        let cfg = base();
        assert_eq!(cfg.queue_url(), cfg.metadata_url);
        assert_eq!(cfg.vector_url(), cfg.metadata_url);
    }

    #[test]
    fn queue_and_vector_url_respect_explicit_override() {
        let mut cfg = base();
        cfg.queue_url = Some("postgres://localhost/queue".into());
        cfg.vector_url = Some("postgres://localhost/vectors".into());
        assert_eq!(cfg.queue_url(), "postgres://localhost/queue");
        assert_eq!(cfg.vector_url(), "postgres://localhost/vectors");
    }

    #[test]
    fn routing_config_carries_token_cost_ranges_through() {
        let cfg = base();
        let routing = cfg.routing_config();
        assert_eq!(routing.token_budget, 50_000);
        assert_eq!(routing.token_costs.patcher.min, 100);
        assert_eq!(routing.token_costs.patcher.max, 500);
        assert_eq!(routing.token_costs.full_regenerate.max, 4_000);
    }
}
