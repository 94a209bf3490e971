use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use coursegen_fsm::{CourseTransitions, FsmError};
use coursegen_types::{
    Course, CourseStatus, FileCatalogEntry, JobStatusRow, Lesson, LessonContent, Organization,
    Section, VectorStatus,
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::ports::{
    CourseRepo, FileRepo, JobStatusRepo, LessonContentRepo, OrganizationRepo, SectionLessonRepo,
};

/// In-memory metadata store used by worker and lesson-graph unit tests.
/// Every write is immediately visible — there is no transaction boundary
/// to simulate, since nothing here is ever partially applied.
#[derive(Default)]
pub struct MemoryStore {
    courses: Mutex<HashMap<Uuid, Course>>,
    files: Mutex<HashMap<Uuid, FileCatalogEntry>>,
    sections: Mutex<HashMap<Uuid, Section>>,
    lessons: Mutex<HashMap<Uuid, Lesson>>,
    lesson_contents: Mutex<HashMap<Uuid, LessonContent>>,
    job_statuses: Mutex<HashMap<Uuid, JobStatusRow>>,
    organizations: Mutex<HashMap<Uuid, Organization>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_course(&self, course: Course) {
        self.courses.lock().unwrap().insert(course.id, course);
    }

    pub fn seed_organization(&self, org: Organization) {
        self.organizations.lock().unwrap().insert(org.id, org);
    }
}

#[async_trait]
impl CourseTransitions for MemoryStore {
    async fn current_status(&self, course_id: Uuid) -> Result<CourseStatus, FsmError> {
        let courses = self.courses.lock().unwrap();
        let course = courses.get(&course_id).ok_or(FsmError::NotFound(course_id))?;
        Ok(course.generation_status())
    }

    async fn apply_transition(
        &self,
        course_id: Uuid,
        to: CourseStatus,
        progress: u8,
        error_message: Option<&str>,
    ) -> Result<(), FsmError> {
        let mut courses = self.courses.lock().unwrap();
        let course = courses.get_mut(&course_id).ok_or(FsmError::NotFound(course_id))?;
        course.generation_status = to.as_str().to_string();
        course.generation_progress = progress as i16;
        if let Some(msg) = error_message {
            let mut meta = course.generation_metadata.clone().unwrap_or(Value::Object(Default::default()));
            meta["error_message"] = Value::String(msg.to_string());
            course.generation_metadata = Some(meta);
        }
        course.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl CourseRepo for MemoryStore {
    async fn get_course(&self, course_id: Uuid) -> Result<Course, StoreError> {
        self.courses
            .lock()
            .unwrap()
            .get(&course_id)
            .cloned()
            .ok_or(StoreError::NotFound("course", course_id))
    }

    async fn update_analysis_result(&self, course_id: Uuid, analysis: Value) -> Result<(), StoreError> {
        let mut courses = self.courses.lock().unwrap();
        let course = courses
            .get_mut(&course_id)
            .ok_or(StoreError::NotFound("course", course_id))?;
        course.analysis_result = Some(analysis);
        Ok(())
    }

    async fn update_course_structure(&self, course_id: Uuid, structure: Value) -> Result<(), StoreError> {
        let mut courses = self.courses.lock().unwrap();
        let course = courses
            .get_mut(&course_id)
            .ok_or(StoreError::NotFound("course", course_id))?;
        course.course_structure = Some(structure);
        Ok(())
    }
}

#[async_trait]
impl FileRepo for MemoryStore {
    async fn get_file(&self, file_id: Uuid) -> Result<FileCatalogEntry, StoreError> {
        self.files
            .lock()
            .unwrap()
            .get(&file_id)
            .cloned()
            .ok_or(StoreError::NotFound("file", file_id))
    }

    async fn list_files_for_course(&self, course_id: Uuid) -> Result<Vec<FileCatalogEntry>, StoreError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn insert_file(
        &self,
        course_id: Uuid,
        organization_id: Uuid,
        filename: &str,
        mime_type: &str,
        file_size: i64,
        storage_path: &str,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.files.lock().unwrap().insert(
            id,
            FileCatalogEntry {
                id,
                course_id,
                organization_id,
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                file_size,
                storage_path: storage_path.to_string(),
                hash: None,
                vector_status: VectorStatus::Pending.as_str().to_string(),
                markdown_content: None,
                processed_content: None,
                metadata: None,
            },
        );
        Ok(id)
    }

    async fn update_vector_status(&self, file_id: Uuid, status: VectorStatus) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(&file_id).ok_or(StoreError::NotFound("file", file_id))?;
        file.vector_status = status.as_str().to_string();
        Ok(())
    }

    async fn update_markdown_content(&self, file_id: Uuid, markdown: &str) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(&file_id).ok_or(StoreError::NotFound("file", file_id))?;
        file.markdown_content = Some(markdown.to_string());
        Ok(())
    }

    async fn update_processed_content(&self, file_id: Uuid, processed: &str) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(&file_id).ok_or(StoreError::NotFound("file", file_id))?;
        file.processed_content = Some(processed.to_string());
        Ok(())
    }
}

#[async_trait]
impl SectionLessonRepo for MemoryStore {
    async fn insert_section(
        &self,
        course_id: Uuid,
        title: &str,
        description: Option<&str>,
        order_index: i32,
    ) -> Result<Uuid, StoreError> {
        if order_index <= 0 {
            return Err(StoreError::Conflict("sections", "order_index must be > 0".into()));
        }
        let id = Uuid::new_v4();
        self.sections.lock().unwrap().insert(
            id,
            Section {
                id,
                course_id,
                title: title.to_string(),
                description: description.map(String::from),
                order_index,
                metadata: None,
            },
        );
        Ok(id)
    }

    async fn insert_lesson(
        &self,
        section_id: Uuid,
        title: &str,
        order_index: i32,
        duration_minutes: Option<i32>,
        lesson_type: &str,
    ) -> Result<Uuid, StoreError> {
        if order_index <= 0 {
            return Err(StoreError::Conflict("lessons", "order_index must be > 0".into()));
        }
        if let Some(d) = duration_minutes {
            if d <= 0 {
                return Err(StoreError::Conflict("lessons", "duration_minutes must be positive".into()));
            }
        }
        let id = Uuid::new_v4();
        self.lessons.lock().unwrap().insert(
            id,
            Lesson {
                id,
                section_id,
                title: title.to_string(),
                order_index,
                duration_minutes,
                lesson_type: lesson_type.to_string(),
                status: "pending".to_string(),
                objectives: None,
                metadata: None,
            },
        );
        Ok(id)
    }

    async fn list_lessons_for_course(&self, course_id: Uuid) -> Result<Vec<Lesson>, StoreError> {
        let section_ids: Vec<Uuid> = self
            .sections
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.course_id == course_id)
            .map(|s| s.id)
            .collect();
        Ok(self
            .lessons
            .lock()
            .unwrap()
            .values()
            .filter(|l| section_ids.contains(&l.section_id))
            .cloned()
            .collect())
    }

    async fn update_lesson_status(&self, lesson_id: Uuid, status: &str) -> Result<(), StoreError> {
        let mut lessons = self.lessons.lock().unwrap();
        let lesson = lessons.get_mut(&lesson_id).ok_or(StoreError::NotFound("lesson", lesson_id))?;
        lesson.status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl LessonContentRepo for MemoryStore {
    async fn upsert_lesson_content(
        &self,
        lesson_id: Uuid,
        course_id: Uuid,
        content: Value,
        metadata: Value,
        status: &str,
    ) -> Result<(), StoreError> {
        self.lesson_contents.lock().unwrap().insert(
            lesson_id,
            LessonContent {
                lesson_id,
                course_id,
                content: Some(content),
                metadata: Some(metadata),
                status: status.to_string(),
            },
        );
        Ok(())
    }

    async fn get_lesson_content(&self, lesson_id: Uuid) -> Result<Option<LessonContent>, StoreError> {
        Ok(self.lesson_contents.lock().unwrap().get(&lesson_id).cloned())
    }
}

#[async_trait]
impl JobStatusRepo for MemoryStore {
    async fn upsert_job_status(
        &self,
        job_id: Uuid,
        course_id: Uuid,
        job_type: &str,
        state: &str,
        attempt: i32,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.job_statuses.lock().unwrap().insert(
            job_id,
            JobStatusRow {
                id: job_id,
                course_id,
                job_type: job_type.to_string(),
                state: state.to_string(),
                attempt,
                error_message: error_message.map(String::from),
            },
        );
        Ok(())
    }

    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobStatusRow>, StoreError> {
        Ok(self.job_statuses.lock().unwrap().get(&job_id).cloned())
    }
}

#[async_trait]
impl OrganizationRepo for MemoryStore {
    async fn get_organization(&self, organization_id: Uuid) -> Result<Organization, StoreError> {
        self.organizations
            .lock()
            .unwrap()
            .get(&organization_id)
            .cloned()
            .ok_or(StoreError::NotFound("organization", organization_id))
    }

    async fn increment_storage_used(&self, organization_id: Uuid, bytes: i64) -> Result<(), StoreError> {
        let mut orgs = self.organizations.lock().unwrap();
        let org = orgs
            .get_mut(&organization_id)
            .ok_or(StoreError::NotFound("organization", organization_id))?;
        org.storage_used_bytes += bytes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: Uuid, status: CourseStatus) -> Course {
        Course {
            id,
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Intro to Rust".into(),
            slug: "intro-to-rust".into(),
            status: "active".into(),
            generation_status: status.as_str().to_string(),
            generation_progress: status.fixed_progress().unwrap_or(0) as i16,
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

    #[tokio::test]
    async fn insert_lesson_rejects_non_positive_order_index() {
        let store = MemoryStore::new();
        let err = store
            .insert_lesson(Uuid::new_v4(), "Lesson 1", 0, Some(15), "video")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(..)));
    }

    #[tokio::test]
    async fn lesson_content_upsert_is_keyed_by_lesson_id() {
        let store = MemoryStore::new();
        let lesson_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        store
            .upsert_lesson_content(lesson_id, course_id, Value::Null, Value::Null, "completed")
            .await
            .unwrap();
        store
            .upsert_lesson_content(lesson_id, course_id, Value::Bool(true), Value::Null, "completed")
            .await
            .unwrap();
        let row = store.get_lesson_content(lesson_id).await.unwrap().unwrap();
        assert_eq!(row.content, Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn storage_used_accumulates() {
        let store = MemoryStore::new();
        let org_id = Uuid::new_v4();
        store.seed_organization(Organization {
            id: org_id,
            name: "Acme".into(),
            tier: "free".into(),
            storage_quota_bytes: 1000,
            storage_used_bytes: 0,
        });
        store.increment_storage_used(org_id, 400).await.unwrap();
        store.increment_storage_used(org_id, 200).await.unwrap();
        let org = store.get_organization(org_id).await.unwrap();
        assert_eq!(org.storage_used_bytes, 600);
    }

    #[tokio::test]
    async fn course_transitions_update_status_and_progress() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.seed_course(course(id, CourseStatus::Pending));
        store
            .apply_transition(id, CourseStatus::Uploading, 10, None)
            .await
            .unwrap();
        let c = store.get_course(id).await.unwrap();
        assert_eq!(c.generation_status(), CourseStatus::Uploading);
        assert_eq!(c.generation_progress, 10);
    }
}
