//! Fixed-size worker pool: one `reserve -> dispatch -> complete/fail`
//! consumer task per concurrency slot, the same `JoinSet` + `watch`
//! shutdown shape used by other stream-worker implementations,
//! generalized from one job type to `StageRegistry`'s dispatch-by-type.
//! No implicit/ambient event loop — the pool is an explicit object the
//! CLI constructs and runs.

use std::sync::Arc;
use std::time::Duration;

use coursegen_queue::JobQueue;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dispatch::StageRegistry;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub reserve_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            reserve_timeout: Duration::from_secs(5),
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    registry: Arc<StageRegistry>,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, registry: Arc<StageRegistry>, config: PoolConfig) -> Self {
        Self { queue, registry, config }
    }

    /// Spawns `config.concurrency` consumer tasks and blocks until
    /// `shutdown` is signalled, then waits for in-flight jobs to drain.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks: JoinSet<()> = JoinSet::new();

        for slot in 0..self.config.concurrency {
            let queue = self.queue.clone();
            let registry = self.registry.clone();
            let config = self.config;
            let mut slot_shutdown = shutdown.clone();
            let consumer_id = format!("worker-{slot}-{}", Uuid::new_v4());

            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        _ = slot_shutdown.changed() => {
                            if *slot_shutdown.borrow() {
                                info!(consumer_id, "worker slot shutting down");
                                return;
                            }
                        }
                        reserved = queue.reserve(&consumer_id, config.reserve_timeout) => {
                            match reserved {
                                Ok(Some(job)) => {
                                    let outcome = registry.dispatch(job.payload).await;
                                    match outcome {
                                        Ok(_) => {
                                            if let Err(e) = queue.complete(job.job_id).await {
                                                error!(consumer_id, job_id = %job.job_id, error = %e, "failed to mark job complete");
                                            }
                                        }
                                        Err(e) => {
                                            warn!(consumer_id, job_id = %job.job_id, error = %e, "stage worker failed");
                                            if let Err(e) = queue.fail(job.job_id, &e.to_string()).await {
                                                error!(consumer_id, job_id = %job.job_id, error = %e, "failed to mark job failed");
                                            }
                                        }
                                    }
                                }
                                Ok(None) => continue,
                                Err(e) => {
                                    error!(consumer_id, error = %e, "queue reserve failed");
                                }
                            }
                        }
                    }
                }
            });
        }

        let _ = shutdown.changed().await;
        while tasks.join_next().await.is_some() {}
    }
}
