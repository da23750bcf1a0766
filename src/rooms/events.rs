//! Event model for execution-instance rooms
//!
//! Typed state-change events with a global sequence, broadcast to every
//! subscriber of the execution instance they belong to.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// State-change events published to a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionEvent {
    StakeholderAcknowledged {
        stakeholder_id: String,
        stakeholder_name: String,
        acknowledged_at: chrono::DateTime<chrono::Utc>,
        response_time_minutes: i64,
    },
    CoordinationComplete {
        coordination_time_minutes: i64,
        acknowledged_count: usize,
        total_stakeholders: usize,
        /// Percentage, 100.0 when everyone acknowledged
        acknowledgment_rate: f64,
    },
    SyncStatusUpdate {
        sync_id: String,
        platform: String,
        status: String,
        progress: u8,
        tasks_synced: u32,
        total_tasks: u32,
    },
    SyncComplete {
        sync_id: String,
        platform: String,
        external_project_id: String,
        tasks_synced: u32,
        sync_duration_seconds: u64,
    },
    SyncError {
        sync_id: String,
        platform: String,
        error_message: String,
        error_code: Option<String>,
        retryable: bool,
    },
}

impl ExecutionEvent {
    /// Wire name of the event kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StakeholderAcknowledged { .. } => "stakeholder-acknowledged",
            Self::CoordinationComplete { .. } => "coordination-complete",
            Self::SyncStatusUpdate { .. } => "sync-status-update",
            Self::SyncComplete { .. } => "sync-complete",
            Self::SyncError { .. } => "sync-error",
        }
    }
}

/// Event envelope with delivery metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub execution_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub event: ExecutionEvent,
}

impl EventEnvelope {
    pub fn new(execution_id: &str, event: ExecutionEvent) -> Self {
        Self {
            sequence: next_sequence(),
            execution_id: execution_id.to_string(),
            timestamp: now_ms(),
            event,
        }
    }
}

/// Global sequence counter for events
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Get the next event sequence number
pub fn next_sequence() -> u64 {
    EVENT_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// Get current timestamp in milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
