use async_trait::async_trait;
use coursegen_fsm::{CourseTransitions, FsmError};
use coursegen_types::{
    Course, CourseStatus, FileCatalogEntry, JobStatusRow, Lesson, LessonContent, Organization,
    VectorStatus,
};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::ports::{
    CourseRepo, FileRepo, JobStatusRepo, LessonContentRepo, OrganizationRepo, SectionLessonRepo,
};
use crate::retry::with_retry;

/// Postgres-backed metadata store adapter. Grounded in the
/// transactional upsert/supersede pattern of a snapshot-store adapter:
/// every cross-row write goes through `pool.begin()`, and transient
/// errors are retried with capped backoff before surfacing.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseTransitions for PgStore {
    async fn current_status(&self, course_id: Uuid) -> Result<CourseStatus, FsmError> {
        let status: String = with_retry("current_status", || async {
            sqlx::query_scalar("SELECT generation_status FROM courses WHERE id = $1")
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound("course", course_id))
        })
        .await?;
        status.parse().map_err(|_| FsmError::Store(format!("corrupt course status: {status}")))
    }

    async fn apply_transition(
        &self,
        course_id: Uuid,
        to: CourseStatus,
        progress: u8,
        error_message: Option<&str>,
    ) -> Result<(), FsmError> {
        with_retry("apply_transition", || async {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(
                "UPDATE courses SET generation_status = $2, generation_progress = $3, updated_at = now() WHERE id = $1",
            )
            .bind(course_id)
            .bind(to.as_str())
            .bind(progress as i16)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("course", course_id));
            }
            if let Some(msg) = error_message {
                sqlx::query(
                    r#"
                    UPDATE courses
                    SET generation_metadata = coalesce(generation_metadata, '{}'::jsonb)
                        || jsonb_build_object('error_message', $2::text)
                    WHERE id = $1
                    "#,
                )
                .bind(course_id)
                .bind(msg)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
        .map_err(Into::into)
    }
}

#[async_trait]
impl CourseRepo for PgStore {
    async fn get_course(&self, course_id: Uuid) -> Result<Course, StoreError> {
        with_retry("get_course", || async {
            sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
                .bind(course_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound("course", course_id))
        })
        .await
    }

    async fn update_analysis_result(&self, course_id: Uuid, analysis: Value) -> Result<(), StoreError> {
        with_retry("update_analysis_result", || async {
            sqlx::query("UPDATE courses SET analysis_result = $2, updated_at = now() WHERE id = $1")
                .bind(course_id)
                .bind(&analysis)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn update_course_structure(&self, course_id: Uuid, structure: Value) -> Result<(), StoreError> {
        with_retry("update_course_structure", || async {
            sqlx::query("UPDATE courses SET course_structure = $2, updated_at = now() WHERE id = $1")
                .bind(course_id)
                .bind(&structure)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl FileRepo for PgStore {
    async fn get_file(&self, file_id: Uuid) -> Result<FileCatalogEntry, StoreError> {
        with_retry("get_file", || async {
            sqlx::query_as::<_, FileCatalogEntry>("SELECT * FROM file_catalog WHERE id = $1")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound("file", file_id))
        })
        .await
    }

    async fn list_files_for_course(&self, course_id: Uuid) -> Result<Vec<FileCatalogEntry>, StoreError> {
        with_retry("list_files_for_course", || async {
            Ok(sqlx::query_as::<_, FileCatalogEntry>(
                "SELECT * FROM file_catalog WHERE course_id = $1 ORDER BY filename",
            )
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
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
        with_retry("insert_file", || async {
            Ok(sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO file_catalog
                    (id, course_id, organization_id, filename, mime_type, file_size, storage_path, vector_status)
                VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'pending')
                RETURNING id
                "#,
            )
            .bind(course_id)
            .bind(organization_id)
            .bind(filename)
            .bind(mime_type)
            .bind(file_size)
            .bind(storage_path)
            .fetch_one(&self.pool)
            .await?)
        })
        .await
    }

    async fn update_vector_status(&self, file_id: Uuid, status: VectorStatus) -> Result<(), StoreError> {
        with_retry("update_vector_status", || async {
            sqlx::query("UPDATE file_catalog SET vector_status = $2 WHERE id = $1")
                .bind(file_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn update_markdown_content(&self, file_id: Uuid, markdown: &str) -> Result<(), StoreError> {
        with_retry("update_markdown_content", || async {
            sqlx::query("UPDATE file_catalog SET markdown_content = $2 WHERE id = $1")
                .bind(file_id)
                .bind(markdown)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn update_processed_content(&self, file_id: Uuid, processed: &str) -> Result<(), StoreError> {
        with_retry("update_processed_content", || async {
            sqlx::query("UPDATE file_catalog SET processed_content = $2 WHERE id = $1")
                .bind(file_id)
                .bind(processed)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SectionLessonRepo for PgStore {
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
        with_retry("insert_section", || async {
            Ok(sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO sections (id, course_id, title, description, order_index)
                VALUES (gen_random_uuid(), $1, $2, $3, $4)
                RETURNING id
                "#,
            )
            .bind(course_id)
            .bind(title)
            .bind(description)
            .bind(order_index)
            .fetch_one(&self.pool)
            .await?)
        })
        .await
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
        with_retry("insert_lesson", || async {
            Ok(sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO lessons (id, section_id, title, order_index, duration_minutes, lesson_type, status)
                VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, 'pending')
                ON CONFLICT (section_id, order_index) DO UPDATE SET title = excluded.title
                RETURNING id
                "#,
            )
            .bind(section_id)
            .bind(title)
            .bind(order_index)
            .bind(duration_minutes)
            .bind(lesson_type)
            .fetch_one(&self.pool)
            .await?)
        })
        .await
    }

    async fn list_lessons_for_course(&self, course_id: Uuid) -> Result<Vec<Lesson>, StoreError> {
        with_retry("list_lessons_for_course", || async {
            Ok(sqlx::query_as::<_, Lesson>(
                r#"
                SELECT l.* FROM lessons l
                JOIN sections s ON s.id = l.section_id
                WHERE s.course_id = $1
                ORDER BY s.order_index, l.order_index
                "#,
            )
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    async fn update_lesson_status(&self, lesson_id: Uuid, status: &str) -> Result<(), StoreError> {
        with_retry("update_lesson_status", || async {
            sqlx::query("UPDATE lessons SET status = $2 WHERE id = $1")
                .bind(lesson_id)
                .bind(status)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LessonContentRepo for PgStore {
    async fn upsert_lesson_content(
        &self,
        lesson_id: Uuid,
        course_id: Uuid,
        content: Value,
        metadata: Value,
        status: &str,
    ) -> Result<(), StoreError> {
        with_retry("upsert_lesson_content", || async {
            sqlx::query(
                r#"
                INSERT INTO lesson_contents (lesson_id, course_id, content, metadata, status)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (lesson_id) DO UPDATE
                SET content = excluded.content, metadata = excluded.metadata, status = excluded.status
                "#,
            )
            .bind(lesson_id)
            .bind(course_id)
            .bind(&content)
            .bind(&metadata)
            .bind(status)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_lesson_content(&self, lesson_id: Uuid) -> Result<Option<LessonContent>, StoreError> {
        with_retry("get_lesson_content", || async {
            Ok(
                sqlx::query_as::<_, LessonContent>("SELECT * FROM lesson_contents WHERE lesson_id = $1")
                    .bind(lesson_id)
                    .fetch_optional(&self.pool)
                    .await?,
            )
        })
        .await
    }
}

#[async_trait]
impl JobStatusRepo for PgStore {
    async fn upsert_job_status(
        &self,
        job_id: Uuid,
        course_id: Uuid,
        job_type: &str,
        state: &str,
        attempt: i32,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        with_retry("upsert_job_status", || async {
            sqlx::query(
                r#"
                INSERT INTO job_status (id, course_id, job_type, state, attempt, error_message)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE
                SET state = excluded.state, attempt = excluded.attempt, error_message = excluded.error_message
                "#,
            )
            .bind(job_id)
            .bind(course_id)
            .bind(job_type)
            .bind(state)
            .bind(attempt)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobStatusRow>, StoreError> {
        with_retry("get_job_status", || async {
            Ok(
                sqlx::query_as::<_, JobStatusRow>("SELECT * FROM job_status WHERE id = $1")
                    .bind(job_id)
                    .fetch_optional(&self.pool)
                    .await?,
            )
        })
        .await
    }
}

#[async_trait]
impl OrganizationRepo for PgStore {
    async fn get_organization(&self, organization_id: Uuid) -> Result<Organization, StoreError> {
        with_retry("get_organization", || async {
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
                .bind(organization_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(StoreError::NotFound("organization", organization_id))
        })
        .await
    }

    async fn increment_storage_used(&self, organization_id: Uuid, bytes: i64) -> Result<(), StoreError> {
        with_retry("increment_storage_used", || async {
            let result = sqlx::query(
                "UPDATE organizations SET storage_used_bytes = storage_used_bytes + $2 WHERE id = $1",
            )
            .bind(organization_id)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound("organization", organization_id));
            }
            Ok(())
        })
        .await
    }
}
