use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Generate a prefixed id, e.g. `exec_7f3b...`
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

/// Delivery channel kinds a notification can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Webhook,
}

impl ChannelKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle of one playbook activation.
///
/// `Complete` and `Failed` are terminal; an instance is immutable once it
/// reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Started,
    Coordinating,
    Complete,
    Failed,
}

impl ExecutionStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Coordinating => "coordinating",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One playbook activation, the unit of coordination tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInstance {
    pub id: String,
    pub playbook_id: String,
    pub scenario_id: String,
    pub organization_id: Option<String>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionInstance {
    pub fn new(playbook_id: &str, scenario_id: &str, organization_id: Option<String>) -> Self {
        Self {
            id: new_id("exec"),
            playbook_id: playbook_id.to_string(),
            scenario_id: scenario_id.to_string(),
            organization_id,
            status: ExecutionStatus::Started,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Notification priority, carried through to the channel adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A roster entry: one stakeholder expected to acknowledge an activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stakeholder {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub webhook_url: Option<String>,
    pub channels: Vec<ChannelKind>,
}

/// One message to one recipient. Append-only audit record: never deleted,
/// only `sent_at`/`acknowledged_at` are stamped after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// None for notifications outside any execution instance
    pub execution_id: Option<String>,
    pub recipient_id: String,
    pub recipient_name: String,
    pub channels: Vec<ChannelKind>,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn for_stakeholder(
        execution_id: &str,
        stakeholder: &Stakeholder,
        title: &str,
        message: &str,
        priority: Priority,
    ) -> Self {
        Self {
            id: new_id("ntf"),
            execution_id: Some(execution_id.to_string()),
            recipient_id: stakeholder.id.clone(),
            recipient_name: stakeholder.name.clone(),
            channels: stakeholder.channels.clone(),
            priority,
            title: title.to_string(),
            message: message.to_string(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            sent_at: None,
            acknowledged_at: None,
        }
    }
}

/// Derived record of one stakeholder acknowledgment. Computed once at
/// acknowledgment time and frozen; duplicates get this same value back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcknowledgmentEvent {
    pub stakeholder_id: String,
    pub stakeholder_name: String,
    pub acknowledged_at: DateTime<Utc>,
    pub response_time_minutes: i64,
}

/// Point-in-time view of coordination state. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinationSnapshot {
    pub acknowledged_count: usize,
    pub total_stakeholders: usize,
    pub coordination_progress: f64,
    pub elapsed_time_minutes: i64,
    pub coordination_complete: bool,
}

/// Whole minutes between two timestamps, clamped at zero so reported
/// timestamps behind `started_at` (clock skew) never go negative.
pub fn minutes_between(started_at: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - started_at).num_seconds().max(0) / 60
}
