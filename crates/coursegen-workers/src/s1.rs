//! S1 — Document Upload: validates tier limits, persists the file row,
//! enqueues S2.

use std::sync::Arc;

use async_trait::async_trait;
use coursegen_fsm::{CourseFsm, CourseTransitions};
use coursegen_queue::{EnqueueOptions, JobQueue};
use coursegen_store::MetadataStore;
use coursegen_types::{CourseStatus, JobPayload};

use crate::dispatch::{StageWorker, WorkerOutcome};
use crate::error::StageError;
use crate::fsm_port::StorePort;

/// Default chunking parameters handed down to S2. Not currently exposed
/// as an environment override; revisit if a course ever needs per-upload
/// overrides.
const DEFAULT_CHUNK_SIZE: u32 = 1000;
const DEFAULT_CHUNK_OVERLAP: u32 = 200;

pub struct DocumentUploadWorker<S> {
    store: Arc<S>,
    queue: Arc<dyn JobQueue>,
}

impl<S> DocumentUploadWorker<S> {
    pub fn new(store: Arc<S>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }
}

#[async_trait]
impl<S> StageWorker for DocumentUploadWorker<S>
where
    S: MetadataStore + CourseTransitions + Send + Sync + 'static,
{
    async fn handle(&self, payload: JobPayload) -> Result<WorkerOutcome, StageError> {
        let JobPayload::DocumentUpload {
            course_id,
            organization_id,
            user_id: _,
            filename,
            mime_type,
            size_bytes,
            storage_path,
        } = payload
        else {
            return Err(StageError::PayloadMismatch);
        };

        let fsm = CourseFsm::new(StorePort(self.store.clone()));
        fsm.transition(course_id, CourseStatus::Uploading, None).await?;

        let org = self.store.get_organization(organization_id).await?;
        let tier = org.tier();

        if size_bytes as u64 > tier.max_file_size_bytes() {
            return Err(StageError::TierLimitExceeded("file size", tier_name(tier)));
        }

        let existing = self.store.list_files_for_course(course_id).await?;
        if existing.len() as u32 >= tier.max_files_per_course() {
            return Err(StageError::TierLimitExceeded("file count", tier_name(tier)));
        }

        if size_bytes > org.remaining_storage_bytes() {
            return Err(StageError::StorageQuotaExceeded);
        }

        let file_id = self
            .store
            .insert_file(course_id, organization_id, &filename, &mime_type, size_bytes, &storage_path)
            .await?;
        self.store.increment_storage_used(organization_id, size_bytes).await?;

        self.queue
            .enqueue(
                JobPayload::DocumentProcessing {
                    file_id,
                    course_id,
                    file_path: storage_path,
                    mime_type,
                    chunk_size: DEFAULT_CHUNK_SIZE,
                    chunk_overlap: DEFAULT_CHUNK_OVERLAP,
                },
                EnqueueOptions::default(),
            )
            .await?;

        Ok(WorkerOutcome::done().with_enqueued(coursegen_types::JobType::DocumentProcessing))
    }
}

fn tier_name(tier: coursegen_types::Tier) -> &'static str {
    use coursegen_types::Tier;
    match tier {
        Tier::Free => "free",
        Tier::Pro => "pro",
        Tier::Team => "team",
        Tier::Enterprise => "enterprise",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coursegen_queue::MemoryJobQueue;
    use coursegen_store::MemoryStore;
    use coursegen_types::{Course, Organization};
    use uuid::Uuid;

    fn free_org(id: Uuid) -> Organization {
        Organization {
            id,
            name: "Acme".into(),
            tier: "free".into(),
            storage_quota_bytes: 1_000_000_000,
            storage_used_bytes: 0,
        }
    }

    fn pending_course(id: Uuid, organization_id: Uuid) -> Course {
        Course {
            id,
            organization_id,
            user_id: Uuid::new_v4(),
            title: "Intro to Rust".into(),
            slug: "intro-to-rust".into(),
            status: "active".into(),
            generation_status: "pending".into(),
            generation_progress: 0,
            generation_metadata: None,
            analysis_result: None,
            course_structure: None,
            language: "en".into(),
            style: None,
            share_token: None,
            is_published: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn upload_payload(organization_id: Uuid, course_id: Uuid, size_bytes: i64) -> JobPayload {
        JobPayload::DocumentUpload {
            course_id,
            organization_id,
            user_id: Uuid::new_v4(),
            filename: "notes.pdf".into(),
            mime_type: "application/pdf".into(),
            size_bytes,
            storage_path: "s3://bucket/notes.pdf".into(),
        }
    }

    #[tokio::test]
    async fn accepts_an_upload_within_tier_limits_and_enqueues_s2() {
        let store = Arc::new(MemoryStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        let org_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        store.seed_organization(free_org(org_id));
        store.seed_course(pending_course(course_id, org_id));

        let worker = DocumentUploadWorker::new(store.clone(), queue.clone());
        let outcome = worker
            .handle(upload_payload(org_id, course_id, 1024))
            .await
            .unwrap();

        assert_eq!(outcome.enqueued, vec![coursegen_types::JobType::DocumentProcessing]);
        let course = store.get_course(course_id).await.unwrap();
        assert_eq!(course.generation_status(), CourseStatus::Uploading);
    }

    #[tokio::test]
    async fn rejects_a_file_over_the_tier_size_limit() {
        let store = Arc::new(MemoryStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        let org_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        store.seed_organization(free_org(org_id));
        store.seed_course(pending_course(course_id, org_id));

        let worker = DocumentUploadWorker::new(store, queue);
        let oversized = 11 * 1024 * 1024;
        let err = worker
            .handle(upload_payload(org_id, course_id, oversized))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::TierLimitExceeded("file size", "free")));
    }

    #[tokio::test]
    async fn rejects_an_upload_that_would_exceed_the_storage_quota() {
        let store = Arc::new(MemoryStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::new());
        let org_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        store.seed_organization(Organization {
            storage_quota_bytes: 500,
            storage_used_bytes: 400,
            ..free_org(org_id)
        });
        store.seed_course(pending_course(course_id, org_id));

        let worker = DocumentUploadWorker::new(store, queue);
        let err = worker
            .handle(upload_payload(org_id, course_id, 200))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::StorageQuotaExceeded));
    }
}
