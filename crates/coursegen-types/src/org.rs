use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription tier; governs S1's upload-validation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Pro,
    Team,
    Enterprise,
}

impl Tier {
    pub fn max_file_size_bytes(self) -> u64 {
        match self {
            Tier::Free => 10 * 1024 * 1024,
            Tier::Pro => 50 * 1024 * 1024,
            Tier::Team => 200 * 1024 * 1024,
            Tier::Enterprise => 1024 * 1024 * 1024,
        }
    }

    pub fn max_files_per_course(self) -> u32 {
        match self {
            Tier::Free => 5,
            Tier::Pro => 25,
            Tier::Team => 100,
            Tier::Enterprise => 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub tier: String,
    pub storage_quota_bytes: i64,
    pub storage_used_bytes: i64,
}

impl Organization {
    pub fn tier(&self) -> Tier {
        match self.tier.as_str() {
            "pro" => Tier::Pro,
            "team" => Tier::Team,
            "enterprise" => Tier::Enterprise,
            _ => Tier::Free,
        }
    }

    pub fn remaining_storage_bytes(&self) -> i64 {
        (self.storage_quota_bytes - self.storage_used_bytes).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub organization_id: Uuid,
}
