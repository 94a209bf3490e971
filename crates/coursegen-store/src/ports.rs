use async_trait::async_trait;
use coursegen_types::{
    Course, FileCatalogEntry, JobStatusRow, Lesson, LessonContent, Organization, VectorStatus,
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;

#[async_trait]
pub trait CourseRepo: Send + Sync {
    async fn get_course(&self, course_id: Uuid) -> Result<Course, StoreError>;
    async fn update_analysis_result(&self, course_id: Uuid, analysis: Value) -> Result<(), StoreError>;
    async fn update_course_structure(&self, course_id: Uuid, structure: Value) -> Result<(), StoreError>;
}

#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn get_file(&self, file_id: Uuid) -> Result<FileCatalogEntry, StoreError>;
    async fn list_files_for_course(&self, course_id: Uuid) -> Result<Vec<FileCatalogEntry>, StoreError>;
    async fn insert_file(
        &self,
        course_id: Uuid,
        organization_id: Uuid,
        filename: &str,
        mime_type: &str,
        file_size: i64,
        storage_path: &str,
    ) -> Result<Uuid, StoreError>;
    async fn update_vector_status(&self, file_id: Uuid, status: VectorStatus) -> Result<(), StoreError>;
    async fn update_markdown_content(&self, file_id: Uuid, markdown: &str) -> Result<(), StoreError>;
    async fn update_processed_content(&self, file_id: Uuid, processed: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SectionLessonRepo: Send + Sync {
    async fn insert_section(
        &self,
        course_id: Uuid,
        title: &str,
        description: Option<&str>,
        order_index: i32,
    ) -> Result<Uuid, StoreError>;

    async fn insert_lesson(
        &self,
        section_id: Uuid,
        title: &str,
        order_index: i32,
        duration_minutes: Option<i32>,
        lesson_type: &str,
    ) -> Result<Uuid, StoreError>;

    async fn list_lessons_for_course(&self, course_id: Uuid) -> Result<Vec<Lesson>, StoreError>;
    async fn update_lesson_status(&self, lesson_id: Uuid, status: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LessonContentRepo: Send + Sync {
    /// Idempotent upsert keyed by `lesson_id` (one-to-one).
    async fn upsert_lesson_content(
        &self,
        lesson_id: Uuid,
        course_id: Uuid,
        content: Value,
        metadata: Value,
        status: &str,
    ) -> Result<(), StoreError>;

    async fn get_lesson_content(&self, lesson_id: Uuid) -> Result<Option<LessonContent>, StoreError>;
}

#[async_trait]
pub trait JobStatusRepo: Send + Sync {
    async fn upsert_job_status(
        &self,
        job_id: Uuid,
        course_id: Uuid,
        job_type: &str,
        state: &str,
        attempt: i32,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobStatusRow>, StoreError>;
}

#[async_trait]
pub trait OrganizationRepo: Send + Sync {
    async fn get_organization(&self, organization_id: Uuid) -> Result<Organization, StoreError>;
    async fn increment_storage_used(&self, organization_id: Uuid, bytes: i64) -> Result<(), StoreError>;
}

/// Convenience trait a backend can implement by delegating to the
/// individual repo traits above, so worker code can depend on one object
/// instead of wiring five.
pub trait MetadataStore:
    CourseRepo + FileRepo + SectionLessonRepo + LessonContentRepo + JobStatusRepo + OrganizationRepo
{
}

impl<T> MetadataStore for T where
    T: CourseRepo + FileRepo + SectionLessonRepo + LessonContentRepo + JobStatusRepo + OrganizationRepo
{
}
