use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use coursegen_types::JobPayload;
use uuid::Uuid;

use crate::{BackoffPolicy, EnqueueOptions, JobQueue, QueueError, ReservedJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Waiting,
    Active,
    Dead,
}

struct Entry {
    payload: JobPayload,
    priority: i32,
    attempt: i32,
    max_attempts: i32,
    lane: Lane,
    sequence: u64,
}

/// `Mutex<HashMap>`-backed in-memory queue used by worker unit tests.
/// Not durable and not meant for production — mirrors the split other
/// adapters in this workspace draw between their Postgres backing and
/// in-process test fakes.
pub struct MemoryJobQueue {
    entries: Mutex<HashMap<Uuid, Entry>>,
    backoff: BackoffPolicy,
    next_sequence: Mutex<u64>,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            backoff: BackoffPolicy::default(),
            next_sequence: Mutex::new(0),
        }
    }

    pub fn len_waiting(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.lane == Lane::Waiting)
            .count()
    }

    pub fn len_dead_letter(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.lane == Lane::Dead)
            .count()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        payload: JobPayload,
        opts: EnqueueOptions,
    ) -> Result<Uuid, QueueError> {
        let job_id = Uuid::new_v4();
        let mut seq = self.next_sequence.lock().unwrap();
        let sequence = *seq;
        *seq += 1;
        self.entries.lock().unwrap().insert(
            job_id,
            Entry {
                payload,
                priority: opts.priority,
                attempt: 0,
                max_attempts: opts.max_attempts.unwrap_or(3),
                lane: Lane::Waiting,
                sequence,
            },
        );
        Ok(job_id)
    }

    async fn reserve(
        &self,
        _consumer_id: &str,
        _timeout: Duration,
    ) -> Result<Option<ReservedJob>, QueueError> {
        let mut entries = self.entries.lock().unwrap();
        let next_id = entries
            .iter()
            .filter(|(_, e)| e.lane == Lane::Waiting)
            .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.sequence)))
            .map(|(id, _)| *id);

        let Some(job_id) = next_id else {
            return Ok(None);
        };
        let entry = entries.get_mut(&job_id).expect("just matched");
        entry.lane = Lane::Active;
        entry.attempt += 1;
        Ok(Some(ReservedJob {
            job_id,
            job_type: entry.payload.job_type(),
            payload: entry.payload.clone(),
            attempt: entry.attempt,
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&job_id).ok_or(QueueError::NotFound(job_id))?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, _reason: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        if entry.attempt >= entry.max_attempts {
            entry.lane = Lane::Dead;
        } else {
            entry.lane = Lane::Waiting;
            // Delay is tracked by real backends; the in-memory fake
            // returns the job to waiting immediately since tests do not
            // exercise wall-clock delay.
            let _ = self.backoff.delay_for(entry.attempt);
        }
        Ok(())
    }

    async fn drain(&self) -> Result<u64, QueueError> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.lane != Lane::Waiting);
        Ok((before - entries.len()) as u64)
    }

    async fn obliterate(&self) -> Result<(), QueueError> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}
