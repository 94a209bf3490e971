use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// `file_catalog.vector_status`. Terminal when `Indexed`/`Ready` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
pub enum VectorStatus {
    Pending,
    Indexed,
    Ready,
    Failed,
}

impl VectorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStatus::Pending => "pending",
            VectorStatus::Indexed => "indexed",
            VectorStatus::Ready => "ready",
            VectorStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, VectorStatus::Pending)
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, VectorStatus::Indexed | VectorStatus::Ready)
    }
}

impl fmt::Display for VectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => VectorStatus::Pending,
            "indexed" => VectorStatus::Indexed,
            "ready" => VectorStatus::Ready,
            "failed" => VectorStatus::Failed,
            other => return Err(format!("unknown vector status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct FileCatalogEntry {
    pub id: Uuid,
    pub course_id: Uuid,
    pub organization_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub file_size: i64,
    pub storage_path: String,
    pub hash: Option<String>,
    pub vector_status: String,
    pub markdown_content: Option<String>,
    pub processed_content: Option<String>,
    pub metadata: Option<Value>,
}

impl FileCatalogEntry {
    pub fn vector_status(&self) -> VectorStatus {
        self.vector_status.parse().unwrap_or(VectorStatus::Pending)
    }

    /// Summarization (S3) may only run on files whose S2 parse produced
    /// non-empty markdown.
    pub fn eligible_for_summarization(&self) -> bool {
        self.markdown_content
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(markdown: Option<&str>) -> FileCatalogEntry {
        FileCatalogEntry {
            id: Uuid::nil(),
            course_id: Uuid::nil(),
            organization_id: Uuid::nil(),
            filename: "doc.pdf".into(),
            mime_type: "application/pdf".into(),
            file_size: 10,
            storage_path: "s3://bucket/doc.pdf".into(),
            hash: None,
            vector_status: "ready".into(),
            markdown_content: markdown.map(String::from),
            processed_content: None,
            metadata: None,
        }
    }

    #[test]
    fn eligible_requires_non_empty_markdown() {
        assert!(!entry(None).eligible_for_summarization());
        assert!(!entry(Some("   \n")).eligible_for_summarization());
        assert!(entry(Some("# Title")).eligible_for_summarization());
    }

    #[test]
    fn vector_status_usable_only_for_ready_or_indexed() {
        assert!(VectorStatus::Ready.is_usable());
        assert!(VectorStatus::Indexed.is_usable());
        assert!(!VectorStatus::Pending.is_usable());
        assert!(!VectorStatus::Failed.is_usable());
    }
}
