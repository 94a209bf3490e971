use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursegen_types::{JobPayload, JobType};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{BackoffPolicy, EnqueueOptions, JobQueue, QueueError, ReservedJob};

/// Postgres-backed job queue. Mirrors a `task_result_queue` consumer: a
/// `FOR UPDATE SKIP LOCKED` CTE picks one ready row, the caller processes
/// it out of band, and `complete`/`fail` close the loop. Expects a `jobs`
/// table and a `jobs_dead_letter` table per the persisted-state schema.
pub struct PgJobQueue {
    pool: PgPool,
    backoff: BackoffPolicy,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

struct JobRow {
    id: Uuid,
    job_type: String,
    payload: Value,
    attempt: i32,
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let job_type = payload.job_type();
        let payload_json = serde_json::to_value(&payload)
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let available_at: DateTime<Utc> = Utc::now() + chrono::Duration::milliseconds(opts.delay_ms);
        let max_attempts = opts.max_attempts.unwrap_or_else(|| job_type.default_max_attempts());

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO jobs
                (id, job_type, payload, priority, attempt, max_attempts, state, available_at, created_at, updated_at)
            VALUES
                (gen_random_uuid(), $1, $2, $3, 0, $4, 'waiting', $5, now(), now())
            RETURNING id
            "#,
        )
        .bind(job_type.as_str())
        .bind(&payload_json)
        .bind(opts.priority)
        .bind(max_attempts)
        .bind(available_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn reserve(
        &self,
        consumer_id: &str,
        _timeout: Duration,
    ) -> Result<Option<ReservedJob>, QueueError> {
        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id FROM jobs
                WHERE state = 'waiting' AND available_at <= now()
                ORDER BY priority DESC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            UPDATE jobs j
            SET state = 'active', attempt = j.attempt + 1, updated_at = now(), leased_by = $1
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.job_type, j.payload, j.attempt
            "#,
        )
        .bind(consumer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let job_row = JobRow {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            payload: row.try_get("payload")?,
            attempt: row.try_get("attempt")?,
        };

        let job_type: JobType = job_row
            .job_type
            .parse()
            .map_err(QueueError::Backend)?;
        let payload: JobPayload = serde_json::from_value(job_row.payload)
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        info!(job_id = %job_row.id, %job_type, attempt = job_row.attempt, "reserved job");

        Ok(Some(ReservedJob {
            job_id: job_row.id,
            job_type,
            payload,
            attempt: job_row.attempt,
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1 AND state = 'active'")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::NotReserved(job_id));
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), QueueError> {
        let row = sqlx::query("SELECT attempt, max_attempts FROM jobs WHERE id = $1 AND state = 'active'")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(QueueError::NotReserved(job_id));
        };
        let attempt: i32 = row.try_get("attempt")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;

        if attempt >= max_attempts {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO jobs_dead_letter (id, job_type, payload, attempt, failure_reason, moved_at)
                SELECT id, job_type, payload, attempt, $2, now() FROM jobs WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM jobs WHERE id = $1")
                .bind(job_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            warn!(job_id = %job_id, reason, "job moved to dead letter");
            return Ok(());
        }

        let delay = self.backoff.delay_for(attempt);
        let available_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        sqlx::query(
            "UPDATE jobs SET state = 'waiting', available_at = $2, updated_at = now(), last_error = $3 WHERE id = $1",
        )
        .bind(job_id)
        .bind(available_at)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn drain(&self) -> Result<u64, QueueError> {
        let result = sqlx::query("DELETE FROM jobs WHERE state IN ('waiting', 'delayed')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn obliterate(&self) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM jobs").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM jobs_dead_letter")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
