//! Persistence seam
//!
//! The relational layer lives outside this core; the engine only speaks to it
//! through the [`Store`] trait. [`MemoryStore`] is the reference
//! implementation used by tests and demos.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::coord::types::{ExecutionInstance, Notification};
use crate::core::errors::{Result, RollcallError};
use crate::sync::types::SyncOperation;

/// Boundary contract toward the external persistence layer.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn load_notification(&self, id: &str) -> Result<Notification>;
    async fn save_notification(&self, notification: &Notification) -> Result<()>;
    async fn load_execution(&self, id: &str) -> Result<ExecutionInstance>;
    async fn save_execution(&self, execution: &ExecutionInstance) -> Result<()>;
    async fn load_sync_operation(&self, id: &str) -> Result<SyncOperation>;
    async fn save_sync_operation(&self, operation: &SyncOperation) -> Result<()>;
}

/// In-memory store backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    notifications: DashMap<String, Notification>,
    executions: DashMap<String, ExecutionInstance>,
    sync_operations: DashMap<String, SyncOperation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    /// Notification ids belonging to one execution instance, ordered by
    /// creation time. Inspection helper for tests and demos.
    pub fn notification_ids_for(&self, execution_id: &str) -> Vec<String> {
        let mut found: Vec<(chrono::DateTime<chrono::Utc>, String)> = self
            .notifications
            .iter()
            .filter(|n| n.execution_id.as_deref() == Some(execution_id))
            .map(|n| (n.created_at, n.id.clone()))
            .collect();
        found.sort();
        found.into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_notification(&self, id: &str) -> Result<Notification> {
        self.notifications
            .get(id)
            .map(|n| n.clone())
            .ok_or_else(|| RollcallError::unknown_notification(id))
    }

    async fn save_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn load_execution(&self, id: &str) -> Result<ExecutionInstance> {
        self.executions
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| RollcallError::unknown_instance(id))
    }

    async fn save_execution(&self, execution: &ExecutionInstance) -> Result<()> {
        self.executions
            .insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn load_sync_operation(&self, id: &str) -> Result<SyncOperation> {
        self.sync_operations
            .get(id)
            .map(|o| o.clone())
            .ok_or_else(|| RollcallError::unknown_sync(id))
    }

    async fn save_sync_operation(&self, operation: &SyncOperation) -> Result<()> {
        self.sync_operations
            .insert(operation.id.clone(), operation.clone());
        Ok(())
    }
}
