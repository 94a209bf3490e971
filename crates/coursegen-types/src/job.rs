use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire-stable job type names, multiplexed over one logical queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    DocumentUpload,
    DocumentProcessing,
    Summarization,
    StructureAnalysis,
    StructureGeneration,
    LessonContent,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::DocumentUpload => "DOCUMENT_UPLOAD",
            JobType::DocumentProcessing => "DOCUMENT_PROCESSING",
            JobType::Summarization => "SUMMARIZATION",
            JobType::StructureAnalysis => "STRUCTURE_ANALYSIS",
            JobType::StructureGeneration => "STRUCTURE_GENERATION",
            JobType::LessonContent => "LESSON_CONTENT",
        }
    }

    /// Default retry ceiling; stage workers may override per-type.
    pub fn default_max_attempts(&self) -> i32 {
        match self {
            JobType::DocumentUpload => 3,
            JobType::DocumentProcessing => 3,
            JobType::Summarization => 3,
            JobType::StructureAnalysis => 3,
            JobType::StructureGeneration => 3,
            JobType::LessonContent => 2,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "DOCUMENT_UPLOAD" => JobType::DocumentUpload,
            "DOCUMENT_PROCESSING" => JobType::DocumentProcessing,
            "SUMMARIZATION" => JobType::Summarization,
            "STRUCTURE_ANALYSIS" => JobType::StructureAnalysis,
            "STRUCTURE_GENERATION" => JobType::StructureGeneration,
            "LESSON_CONTENT" => JobType::LessonContent,
            other => return Err(format!("unknown job type: {other}")),
        })
    }
}

/// Typed payload per job type. Replaces the opaque-blob pattern at the
/// stage-worker boundary: unknown shapes are rejected at decode time
/// rather than carried as loose JSON into handler code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "jobType")]
pub enum JobPayload {
    #[serde(rename = "DOCUMENT_UPLOAD")]
    DocumentUpload {
        course_id: Uuid,
        organization_id: Uuid,
        user_id: Uuid,
        filename: String,
        mime_type: String,
        size_bytes: i64,
        storage_path: String,
    },
    #[serde(rename = "DOCUMENT_PROCESSING")]
    DocumentProcessing {
        file_id: Uuid,
        course_id: Uuid,
        file_path: String,
        mime_type: String,
        chunk_size: u32,
        chunk_overlap: u32,
    },
    #[serde(rename = "SUMMARIZATION")]
    Summarization { course_id: Uuid },
    #[serde(rename = "STRUCTURE_ANALYSIS")]
    StructureAnalysis { course_id: Uuid },
    #[serde(rename = "STRUCTURE_GENERATION")]
    StructureGeneration { course_id: Uuid },
    #[serde(rename = "LESSON_CONTENT")]
    LessonContent {
        lesson_id: Uuid,
        course_id: Uuid,
        model_override: Option<String>,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::DocumentUpload { .. } => JobType::DocumentUpload,
            JobPayload::DocumentProcessing { .. } => JobType::DocumentProcessing,
            JobPayload::Summarization { .. } => JobType::Summarization,
            JobPayload::StructureAnalysis { .. } => JobType::StructureAnalysis,
            JobPayload::StructureGeneration { .. } => JobType::StructureGeneration,
            JobPayload::LessonContent { .. } => JobType::LessonContent,
        }
    }

    pub fn course_id(&self) -> Uuid {
        match self {
            JobPayload::DocumentUpload { course_id, .. }
            | JobPayload::DocumentProcessing { course_id, .. }
            | JobPayload::Summarization { course_id }
            | JobPayload::StructureAnalysis { course_id }
            | JobPayload::StructureGeneration { course_id }
            | JobPayload::LessonContent { course_id, .. } => *course_id,
        }
    }
}

/// Job status as owned by the queue itself (distinct from the persisted
/// `job_status` observation row in [`JobStatusRow`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
    Paused,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
            JobState::Paused => "paused",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub priority: i32,
    pub attempt: i32,
    pub max_attempts: i32,
    pub state: JobState,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Observation-only projection of a job's progress, separate from the
/// queue's own bookkeeping, so callers can poll without touching the
/// queue tables directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatusState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct JobStatusRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub job_type: String,
    pub state: String,
    pub attempt: i32,
    pub error_message: Option<String>,
}
