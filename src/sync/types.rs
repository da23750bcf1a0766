use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coord::types::new_id;

/// Lifecycle of one outbound sync attempt.
///
/// `Synced` and `Failed` are final for the operation id; a retry is a brand
/// new operation, never a resurrection of the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl SyncStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Synced | Self::Failed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One outbound sync to an external project-management platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: String,
    pub execution_id: String,
    pub platform: String,
    pub status: SyncStatus,
    /// Percentage, 0-100
    pub progress: u8,
    pub tasks_synced: u32,
    pub total_tasks: u32,
    pub external_project_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    /// Advises whether a new attempt for the same (execution, platform) pair
    /// is sensible. Never reopens this operation.
    pub retryable: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncOperation {
    pub fn new(execution_id: &str, platform: &str, total_tasks: u32) -> Self {
        Self {
            id: new_id("sync"),
            execution_id: execution_id.to_string(),
            platform: platform.to_string(),
            status: SyncStatus::Pending,
            progress: 0,
            tasks_synced: 0,
            total_tasks,
            external_project_id: None,
            error_message: None,
            error_code: None,
            retryable: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}
