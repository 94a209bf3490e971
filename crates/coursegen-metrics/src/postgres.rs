use async_trait::async_trait;
use coursegen_types::NodeMetric;
use sqlx::PgPool;

use crate::{MetricsError, MetricsScope, MetricsSink};

/// Appends one row per recorded node to `node_metrics`. No aggregation
/// happens here; `CourseCostSummary` reads are a downstream concern of
/// whoever queries the table (the CLI's report, for instance).
pub struct PgMetricsSink {
    pool: PgPool,
}

impl PgMetricsSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsSink for PgMetricsSink {
    async fn record(&self, scope: MetricsScope, metric: NodeMetric) -> Result<(), MetricsError> {
        let (course_id, lesson_id) = match scope {
            MetricsScope::Lesson { course_id, lesson_id } => (course_id, Some(lesson_id)),
            MetricsScope::Course { course_id } => (course_id, None),
        };

        sqlx::query(
            r#"
            INSERT INTO node_metrics
                (id, course_id, lesson_id, node_name, model, input_tokens, output_tokens, cost_usd, duration_ms, ok, error_class, recorded_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
            "#,
        )
        .bind(course_id)
        .bind(lesson_id)
        .bind(&metric.node_name)
        .bind(&metric.model)
        .bind(metric.input_tokens as i32)
        .bind(metric.output_tokens as i32)
        .bind(metric.cost_usd)
        .bind(metric.duration_ms as i64)
        .bind(metric.ok)
        .bind(&metric.error_class)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
