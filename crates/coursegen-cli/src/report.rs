//! Builds the run's machine-readable report: per-stage token/cost
//! rollup plus per-lesson quality scores, read back from the metadata
//! store once the pipeline has reached a terminal state.

use coursegen_types::NodeMetric;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use coursegen_metrics::CourseCostSummary;

#[derive(Debug, Serialize)]
pub struct LessonReport {
    pub lesson_id: Uuid,
    pub status: String,
    pub quality_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub course_id: Uuid,
    pub status: String,
    pub cost: CourseCostSummary,
    pub lessons: Vec<LessonReport>,
}

/// `node_name` is recorded as e.g. `"S4_categorization"`, `"S6_generate"`
/// — the stage prefix up to (not including) the first underscore becomes
/// the cost-summary bucket.
fn stage_of(node_name: &str) -> &str {
    node_name.split('_').next().unwrap_or(node_name)
}

pub async fn build(pool: &PgPool, course_id: Uuid) -> Result<Report, sqlx::Error> {
    let course_row = sqlx::query("SELECT generation_status FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_one(pool)
        .await?;
    let status: String = course_row.try_get("generation_status")?;

    let metric_rows = sqlx::query(
        "SELECT node_name, model, input_tokens, output_tokens, cost_usd, duration_ms, ok, error_class \
         FROM node_metrics WHERE course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let mut cost = CourseCostSummary::default();
    for row in &metric_rows {
        let node_name: String = row.try_get("node_name")?;
        let metric = NodeMetric {
            node_name: node_name.clone(),
            model: row.try_get("model")?,
            input_tokens: row.try_get::<i32, _>("input_tokens")? as u32,
            output_tokens: row.try_get::<i32, _>("output_tokens")? as u32,
            cost_usd: row.try_get("cost_usd")?,
            duration_ms: row.try_get::<i64, _>("duration_ms")? as u64,
            ok: row.try_get("ok")?,
            error_class: row.try_get("error_class")?,
        };
        cost.record(stage_of(&node_name), &metric);
    }

    let lesson_rows = sqlx::query(
        "SELECT l.id AS lesson_id, l.status, lc.metadata \
         FROM lessons l \
         JOIN sections s ON s.id = l.section_id \
         LEFT JOIN lesson_contents lc ON lc.lesson_id = l.id \
         WHERE s.course_id = $1",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let mut lessons = Vec::with_capacity(lesson_rows.len());
    for row in &lesson_rows {
        let metadata: Option<serde_json::Value> = row.try_get("metadata")?;
        let quality_score = metadata
            .as_ref()
            .and_then(|m| m.get("quality_score"))
            .and_then(|v| v.as_f64());
        lessons.push(LessonReport {
            lesson_id: row.try_get("lesson_id")?,
            status: row.try_get("status")?,
            quality_score,
        });
    }

    Ok(Report { course_id, status, cost, lessons })
}
