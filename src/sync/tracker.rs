//! Sync status tracker
//!
//! State machine per sync operation: pending -> syncing -> {synced | failed}.
//! Every attempt is kept by id so the audit trail covers failed and retried
//! attempts alike; one live operation per (execution, platform) pair.

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::core::errors::{Result, RollcallError};
use crate::sync::types::{SyncOperation, SyncStatus};

#[derive(Debug, Default)]
pub struct SyncStatusTracker {
    operations: DashMap<String, SyncOperation>,
    /// Latest operation id per "{execution_id}:{platform}" pair.
    latest: DashMap<String, String>,
}

impl SyncStatusTracker {
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
            latest: DashMap::new(),
        }
    }

    fn pair_key(execution_id: &str, platform: &str) -> String {
        format!("{execution_id}:{platform}")
    }

    /// Create a new sync operation and move it straight into `Syncing`.
    ///
    /// Rejected while a non-terminal operation already exists for the same
    /// (execution, platform) pair.
    pub fn start_sync(
        &self,
        execution_id: &str,
        platform: &str,
        total_tasks: u32,
    ) -> Result<SyncOperation> {
        let key = Self::pair_key(execution_id, platform);
        let entry = self.latest.entry(key);

        if let dashmap::mapref::entry::Entry::Occupied(ref occupied) = entry {
            if let Some(existing) = self.operations.get(occupied.get()) {
                if !existing.status.is_terminal() {
                    return Err(RollcallError::invalid_transition(
                        existing.id.clone(),
                        existing.status.as_str(),
                        SyncStatus::Pending.as_str(),
                    ));
                }
            }
        }

        let mut operation = SyncOperation::new(execution_id, platform, total_tasks);
        debug!(sync_id = %operation.id, platform, "Sync operation created");
        operation.status = SyncStatus::Syncing;

        entry.insert(operation.id.clone());
        self.operations
            .insert(operation.id.clone(), operation.clone());
        info!(
            sync_id = %operation.id,
            execution_id,
            platform,
            total_tasks,
            "Sync started"
        );
        Ok(operation)
    }

    /// Update progress on a live operation. Progress is clamped to [0, 100].
    pub fn report_progress(
        &self,
        sync_id: &str,
        tasks_synced: u32,
        progress: u8,
    ) -> Result<SyncOperation> {
        let mut operation = self
            .operations
            .get_mut(sync_id)
            .ok_or_else(|| RollcallError::unknown_sync(sync_id))?;

        if operation.status != SyncStatus::Syncing {
            return Err(RollcallError::invalid_transition(
                sync_id,
                operation.status.as_str(),
                SyncStatus::Syncing.as_str(),
            ));
        }

        operation.tasks_synced = tasks_synced.min(operation.total_tasks);
        operation.progress = progress.min(100);
        debug!(
            sync_id,
            tasks_synced = operation.tasks_synced,
            progress = operation.progress,
            "Sync progress"
        );
        Ok(operation.clone())
    }

    /// Terminal success transition.
    pub fn complete(
        &self,
        sync_id: &str,
        external_project_id: &str,
        tasks_synced: u32,
    ) -> Result<SyncOperation> {
        let mut operation = self
            .operations
            .get_mut(sync_id)
            .ok_or_else(|| RollcallError::unknown_sync(sync_id))?;

        if operation.status != SyncStatus::Syncing {
            return Err(RollcallError::invalid_transition(
                sync_id,
                operation.status.as_str(),
                SyncStatus::Synced.as_str(),
            ));
        }

        operation.status = SyncStatus::Synced;
        operation.progress = 100;
        operation.tasks_synced = tasks_synced;
        operation.external_project_id = Some(external_project_id.to_string());
        operation.completed_at = Some(chrono::Utc::now());
        info!(sync_id, external_project_id, "Sync complete");
        Ok(operation.clone())
    }

    /// Terminal failure transition. `retryable` only advises whether a new
    /// `start_sync` attempt is sensible.
    pub fn fail(
        &self,
        sync_id: &str,
        error_message: &str,
        error_code: Option<&str>,
        retryable: bool,
    ) -> Result<SyncOperation> {
        let mut operation = self
            .operations
            .get_mut(sync_id)
            .ok_or_else(|| RollcallError::unknown_sync(sync_id))?;

        if operation.status.is_terminal() {
            return Err(RollcallError::invalid_transition(
                sync_id,
                operation.status.as_str(),
                SyncStatus::Failed.as_str(),
            ));
        }

        operation.status = SyncStatus::Failed;
        operation.error_message = Some(error_message.to_string());
        operation.error_code = error_code.map(str::to_string);
        operation.retryable = retryable;
        operation.completed_at = Some(chrono::Utc::now());
        warn!(sync_id, error_message, retryable, "Sync failed");
        Ok(operation.clone())
    }

    pub fn get(&self, sync_id: &str) -> Result<SyncOperation> {
        self.operations
            .get(sync_id)
            .map(|op| op.clone())
            .ok_or_else(|| RollcallError::unknown_sync(sync_id))
    }

    /// Every attempt recorded for an execution instance, ordered by start.
    pub fn operations_for(&self, execution_id: &str) -> Vec<SyncOperation> {
        let mut ops: Vec<SyncOperation> = self
            .operations
            .iter()
            .filter(|op| op.execution_id == execution_id)
            .map(|op| op.clone())
            .collect();
        ops.sort_by_key(|op| op.started_at);
        ops
    }
}
