use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Course generation status. Linear except for the `Failed` sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
pub enum CourseStatus {
    Pending,
    Uploading,
    Parsing,
    Summarizing,
    Analyzing,
    Structuring,
    GeneratingLessons,
    Completed,
    Failed,
}

const LINEAR_ORDER: [CourseStatus; 8] = [
    CourseStatus::Pending,
    CourseStatus::Uploading,
    CourseStatus::Parsing,
    CourseStatus::Summarizing,
    CourseStatus::Analyzing,
    CourseStatus::Structuring,
    CourseStatus::GeneratingLessons,
    CourseStatus::Completed,
];

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Pending => "pending",
            CourseStatus::Uploading => "uploading",
            CourseStatus::Parsing => "parsing",
            CourseStatus::Summarizing => "summarizing",
            CourseStatus::Analyzing => "analyzing",
            CourseStatus::Structuring => "structuring",
            CourseStatus::GeneratingLessons => "generating_lessons",
            CourseStatus::Completed => "completed",
            CourseStatus::Failed => "failed",
        }
    }

    /// The fixed 0/10/25/40/55/70/85/100 progress mapping. `Failed` keeps
    /// whatever progress the course had when it failed, so this returns
    /// `None` for it — callers must not overwrite progress on failure.
    pub fn fixed_progress(&self) -> Option<u8> {
        match self {
            CourseStatus::Pending => Some(0),
            CourseStatus::Uploading => Some(10),
            CourseStatus::Parsing => Some(25),
            CourseStatus::Summarizing => Some(40),
            CourseStatus::Analyzing => Some(55),
            CourseStatus::Structuring => Some(70),
            CourseStatus::GeneratingLessons => Some(85),
            CourseStatus::Completed => Some(100),
            CourseStatus::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CourseStatus::Completed | CourseStatus::Failed)
    }

    /// The only legal successor from a non-terminal state (besides
    /// `Failed`, which is always legal and handled separately by callers).
    pub fn legal_successor(&self) -> Option<CourseStatus> {
        let idx = LINEAR_ORDER.iter().position(|s| s == self)?;
        LINEAR_ORDER.get(idx + 1).copied()
    }

    /// Whether `to` is a legal transition target from `self`: the linear
    /// successor, or `failed` from any non-terminal state.
    pub fn can_transition_to(&self, to: CourseStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == CourseStatus::Failed || self.legal_successor() == Some(to)
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => CourseStatus::Pending,
            "uploading" => CourseStatus::Uploading,
            "parsing" => CourseStatus::Parsing,
            "summarizing" => CourseStatus::Summarizing,
            "analyzing" => CourseStatus::Analyzing,
            "structuring" => CourseStatus::Structuring,
            "generating_lessons" => CourseStatus::GeneratingLessons,
            "completed" => CourseStatus::Completed,
            "failed" => CourseStatus::Failed,
            other => return Err(format!("unknown course status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Course {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub slug: String,
    pub status: String,
    pub generation_status: String,
    pub generation_progress: i16,
    pub generation_metadata: Option<Value>,
    pub analysis_result: Option<Value>,
    pub course_structure: Option<Value>,
    pub language: String,
    pub style: Option<String>,
    pub share_token: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn generation_status(&self) -> CourseStatus {
        self.generation_status
            .parse()
            .unwrap_or(CourseStatus::Pending)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.generation_metadata
            .as_ref()
            .and_then(|m| m.get("error_message"))
            .and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Section {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub order_index: i32,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Lesson {
    pub id: Uuid,
    pub section_id: Uuid,
    pub title: String,
    pub order_index: i32,
    pub duration_minutes: Option<i32>,
    pub lesson_type: String,
    pub status: String,
    pub objectives: Option<Value>,
    pub metadata: Option<Value>,
}

/// `LessonContent.status`. `review_required` implies at least one
/// unresolved `major` issue remained after the refinement cap was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
pub enum LessonContentStatus {
    Pending,
    Generating,
    Completed,
    Failed,
    ReviewRequired,
}

impl LessonContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonContentStatus::Pending => "pending",
            LessonContentStatus::Generating => "generating",
            LessonContentStatus::Completed => "completed",
            LessonContentStatus::Failed => "failed",
            LessonContentStatus::ReviewRequired => "review_required",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LessonContentStatus::Pending | LessonContentStatus::Generating)
    }
}

impl fmt::Display for LessonContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct LessonContent {
    pub lesson_id: Uuid,
    pub course_id: Uuid,
    pub content: Option<Value>,
    pub metadata: Option<Value>,
    pub status: String,
}

impl LessonContent {
    pub fn status(&self) -> LessonContentStatus {
        match self.status.as_str() {
            "generating" => LessonContentStatus::Generating,
            "completed" => LessonContentStatus::Completed,
            "failed" => LessonContentStatus::Failed,
            "review_required" => LessonContentStatus::ReviewRequired,
            _ => LessonContentStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_successor_chain_reaches_completed() {
        let mut s = CourseStatus::Pending;
        let mut hops = 0;
        while let Some(next) = s.legal_successor() {
            s = next;
            hops += 1;
            assert!(hops <= 8, "successor chain should terminate at completed");
        }
        assert_eq!(s, CourseStatus::Completed);
    }

    #[test]
    fn failed_has_no_successor_and_is_terminal() {
        assert_eq!(CourseStatus::Failed.legal_successor(), None);
        assert!(CourseStatus::Failed.is_terminal());
        assert!(!CourseStatus::Failed.can_transition_to(CourseStatus::Pending));
    }

    #[test]
    fn failed_is_always_a_legal_target_from_non_terminal_states() {
        for s in LINEAR_ORDER.iter().take(7) {
            assert!(s.can_transition_to(CourseStatus::Failed));
        }
    }

    #[test]
    fn only_the_linear_successor_is_legal_besides_failed() {
        assert!(CourseStatus::Parsing.can_transition_to(CourseStatus::Summarizing));
        assert!(!CourseStatus::Parsing.can_transition_to(CourseStatus::Analyzing));
        assert!(!CourseStatus::Parsing.can_transition_to(CourseStatus::Pending));
    }

    #[test]
    fn progress_mapping_matches_fixed_points() {
        assert_eq!(CourseStatus::Pending.fixed_progress(), Some(0));
        assert_eq!(CourseStatus::Structuring.fixed_progress(), Some(70));
        assert_eq!(CourseStatus::Completed.fixed_progress(), Some(100));
        assert_eq!(CourseStatus::Failed.fixed_progress(), None);
    }

    #[test]
    fn course_status_round_trips_through_str() {
        for s in LINEAR_ORDER.iter().copied().chain(std::iter::once(CourseStatus::Failed)) {
            let parsed: CourseStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
