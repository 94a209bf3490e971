//! Durable job queue: FIFO-with-priority, at-least-once delivery,
//! exponential-backoff retry, dead-letter partition.
//!
//! One logical queue multiplexes every job type, following a single
//! consumer-loop shape generalized to a reusable trait with a
//! Postgres-backed production adapter and an in-memory adapter for
//! worker unit tests.

mod error;
#[cfg(feature = "database")]
mod postgres;
mod memory;

pub use error::QueueError;
pub use memory::MemoryJobQueue;
#[cfg(feature = "database")]
pub use postgres::PgJobQueue;

use std::time::Duration;

use async_trait::async_trait;
use coursegen_types::{JobPayload, JobType};
use uuid::Uuid;

/// Backoff used both by this queue's own retry schedule and as the
/// template other adapters (e.g. the metadata store's retry policy)
/// follow: `base * 2^(attempt-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl BackoffPolicy {
    /// `attempt` is 1-based (the attempt number that just failed).
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let attempt = attempt.max(1) as u32;
        let raw = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20) - 1);
        Duration::from_millis(raw.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub delay_ms: i64,
    pub max_attempts: Option<i32>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 10,
            delay_ms: 0,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub attempt: i32,
}

/// The queue port. Workers depend on this trait, never on a concrete
/// backend, so unit tests can swap in [`MemoryJobQueue`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError>;

    /// Atomically moves one ready job from waiting to active and leases
    /// it to `consumer_id`. Returns `None` if nothing is ready within
    /// `timeout`. A lease that is never completed/failed (the worker
    /// crashed) expires and the job returns to `waiting` with `attempt`
    /// unchanged.
    async fn reserve(
        &self,
        consumer_id: &str,
        timeout: Duration,
    ) -> Result<Option<ReservedJob>, QueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Reschedules with backoff up to `max_attempts`; beyond that, moves
    /// the job to the dead-letter partition.
    async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), QueueError>;

    /// Test/teardown: removes all waiting/delayed jobs, leaving active
    /// leases untouched.
    async fn drain(&self) -> Result<u64, QueueError>;

    /// Test/teardown: removes every job including active leases and the
    /// dead-letter partition.
    async fn obliterate(&self) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(7), Duration::from_millis(60_000));
    }
}
