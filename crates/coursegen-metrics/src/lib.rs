//! Metrics / Cost Ledger: per-node token counts, cost, duration, and
//! quality scores, aggregated per lesson and per course, plus budget
//! enforcement for the Stage 6 refinement loop.

mod memory;
#[cfg(feature = "database")]
mod postgres;

pub use memory::InMemoryMetricsSink;
#[cfg(feature = "database")]
pub use postgres::PgMetricsSink;

use async_trait::async_trait;
use coursegen_types::{ErrorKind, ErrorKindExt, NodeMetric};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[cfg(feature = "database")]
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("budget exceeded: used {used} > budget {budget}")]
    BudgetExceeded { used: u64, budget: u64 },
}

impl ErrorKindExt for MetricsError {
    fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "database")]
            MetricsError::Database(_) => ErrorKind::NetTransient,
            MetricsError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
        }
    }
}

/// Where to attribute a recorded node: either a lesson (Stage 6 node) or
/// a course-level stage (S1…S5 have no lesson id).
#[derive(Debug, Clone, Copy)]
pub enum MetricsScope {
    Lesson { course_id: Uuid, lesson_id: Uuid },
    Course { course_id: Uuid },
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, scope: MetricsScope, metric: NodeMetric) -> Result<(), MetricsError>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageCost {
    pub tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CourseCostSummary {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub by_stage: HashMap<String, StageCost>,
}

impl CourseCostSummary {
    pub fn record(&mut self, stage: &str, metric: &NodeMetric) {
        let tokens = (metric.input_tokens + metric.output_tokens) as u64;
        self.total_tokens += tokens;
        self.total_cost_usd += metric.cost_usd;
        let entry = self.by_stage.entry(stage.to_string()).or_default();
        entry.tokens += tokens;
        entry.cost_usd += metric.cost_usd;
    }
}

/// Hard-fails when `used` exceeds `budget`, the
/// `targetedRefinementTokensUsed > budget` rule.
pub fn enforce_budget(used: u64, budget: u64) -> Result<(), MetricsError> {
    if used > budget {
        return Err(MetricsError::BudgetExceeded { used, budget });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(tokens_in: u32, tokens_out: u32, cost: f64) -> NodeMetric {
        NodeMetric {
            node_name: "generate".into(),
            model: "primary".into(),
            input_tokens: tokens_in,
            output_tokens: tokens_out,
            cost_usd: cost,
            duration_ms: 100,
            ok: true,
            error_class: None,
        }
    }

    #[test]
    fn enforce_budget_passes_under_budget() {
        assert!(enforce_budget(500, 1000).is_ok());
    }

    #[test]
    fn enforce_budget_fails_over_budget() {
        let err = enforce_budget(1500, 1000).unwrap_err();
        assert!(matches!(err, MetricsError::BudgetExceeded { used: 1500, budget: 1000 }));
    }

    #[test]
    fn course_summary_aggregates_by_stage() {
        let mut summary = CourseCostSummary::default();
        summary.record("S4_analysis", &metric(100, 200, 0.01));
        summary.record("S4_analysis", &metric(50, 50, 0.005));
        summary.record("S6_lesson_content", &metric(1000, 500, 0.2));

        assert_eq!(summary.total_tokens, 1900);
        assert!((summary.total_cost_usd - 0.215).abs() < 1e-9);
        assert_eq!(summary.by_stage["S4_analysis"].tokens, 400);
        assert_eq!(summary.by_stage["S6_lesson_content"].tokens, 1500);
    }
}
