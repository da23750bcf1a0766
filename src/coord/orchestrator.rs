//! Coordination orchestrator
//!
//! Sequences activation -> tracker creation -> notification fan-out, relays
//! acknowledgment submissions into the tracker and state changes out to the
//! room subscribers. The only component that touches every other one.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::coord::tracker::CoordinationTracker;
use crate::coord::types::{
    minutes_between, CoordinationSnapshot, ExecutionStatus, Notification, Priority, Stakeholder,
};
use crate::core::config::CoordinatorConfig;
use crate::core::errors::{Result, RollcallError};
use crate::dispatch::dispatcher::Dispatcher;
use crate::rooms::broadcaster::{EventBroadcaster, RoomSubscription};
use crate::rooms::events::ExecutionEvent;
use crate::store::Store;
use crate::sync::tracker::SyncStatusTracker;
use crate::sync::types::SyncOperation;

/// Everything needed to activate a playbook for a stakeholder roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub playbook_id: String,
    pub scenario_id: String,
    pub organization_id: Option<String>,
    pub roster: Vec<Stakeholder>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
}

/// What an acknowledging caller gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckReceipt {
    pub response_time_minutes: i64,
    pub coordination_complete: bool,
}

/// Combined status answer for one execution instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatusView {
    pub status: ExecutionStatus,
    pub coordination: CoordinationSnapshot,
}

/// Root component wiring tracker, dispatcher, sync tracker and broadcaster.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    tracker: CoordinationTracker,
    sync_tracker: SyncStatusTracker,
    dispatcher: Dispatcher,
    broadcaster: EventBroadcaster,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        dispatcher: Dispatcher,
        config: CoordinatorConfig,
    ) -> Self {
        let broadcaster = EventBroadcaster::new(config.room_buffer_size, config.max_rooms);
        Self {
            store,
            tracker: CoordinationTracker::new(),
            sync_tracker: SyncStatusTracker::new(),
            dispatcher,
            broadcaster,
            config,
        }
    }

    /// Activate a playbook: create the instance and its roster notifications,
    /// fan deliveries out through the dispatcher, and move the instance to
    /// `Coordinating`.
    ///
    /// Delivery failures never abort activation - a stakeholder whose every
    /// channel failed simply never acknowledges, which caps progress below
    /// 1.0 until resolved manually. The per-channel outcomes are persisted on
    /// the notification records.
    #[instrument(skip(self, request), fields(playbook_id = %request.playbook_id))]
    pub async fn activate(&self, request: ActivationRequest) -> Result<String> {
        if request.roster.is_empty() {
            return Err(RollcallError::validation_field("roster is empty", "roster"));
        }
        if request.roster.len() > self.config.max_roster_size {
            return Err(RollcallError::resource_exhausted(
                "roster",
                request.roster.len() as u64,
                self.config.max_roster_size as u64,
            ));
        }

        let instance = crate::coord::types::ExecutionInstance::new(
            &request.playbook_id,
            &request.scenario_id,
            request.organization_id.clone(),
        );
        let notifications: Vec<Notification> = request
            .roster
            .iter()
            .map(|stakeholder| {
                Notification::for_stakeholder(
                    &instance.id,
                    stakeholder,
                    &request.title,
                    &request.message,
                    request.priority,
                )
            })
            .collect();

        // Tracker creation failing means no instance exists at all.
        self.tracker.create(&instance, &notifications)?;

        self.store.save_execution(&instance).await?;
        for notification in &notifications {
            self.store.save_notification(notification).await?;
        }

        info!(
            execution_id = %instance.id,
            stakeholders = notifications.len(),
            "Playbook activated, dispatching notifications"
        );

        // Fan out deliveries concurrently, outside any tracker lock. Each
        // outcome lands on its notification record; none of them can abort
        // the activation of the rest of the roster.
        let sends = notifications
            .iter()
            .zip(request.roster.iter())
            .map(|(notification, stakeholder)| async move {
                let report = self.dispatcher.dispatch(notification, stakeholder).await;
                // An acknowledgment may already have landed while the
                // channels were in flight; stamp the stored record, not the
                // pre-dispatch clone, so acknowledged_at survives.
                let mut updated = match self.store.load_notification(&notification.id).await {
                    Ok(current) => current,
                    Err(_) => notification.clone(),
                };
                updated.sent_at = report.sent_at;
                let mut metadata_entry = serde_json::Map::new();
                for outcome in &report.outcomes {
                    metadata_entry.insert(
                        outcome.channel.to_string(),
                        serde_json::to_value(outcome).unwrap_or(serde_json::Value::Null),
                    );
                }
                updated.metadata.insert(
                    "delivery".to_string(),
                    serde_json::Value::Object(metadata_entry),
                );
                if let Err(err) = self.store.save_notification(&updated).await {
                    error!(
                        notification_id = %notification.id,
                        error = %err,
                        "Failed to persist dispatch outcome"
                    );
                }
                report.success
            });
        let results = join_all(sends).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        if delivered < results.len() {
            warn!(
                execution_id = %instance.id,
                delivered,
                total = results.len(),
                "Activation completed with partial delivery"
            );
        }

        let instance = self.tracker.mark_coordinating(&instance.id).await?;
        self.store.save_execution(&instance).await?;

        Ok(instance.id)
    }

    /// Record a stakeholder acknowledgment and broadcast the resulting state
    /// changes. Duplicate submissions are absorbed without a second event.
    #[instrument(skip(self, timestamp))]
    pub async fn acknowledge(
        &self,
        notification_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AckReceipt> {
        let notification = self.store.load_notification(notification_id).await?;
        let execution_id = notification.execution_id.clone().ok_or_else(|| {
            RollcallError::validation_field(
                "notification is not tied to an execution instance",
                "execution_id",
            )
        })?;

        let outcome = self
            .tracker
            .record_acknowledgment(&execution_id, notification_id, timestamp)
            .await?;

        if let (true, Some(event)) = (outcome.applied, outcome.event.clone()) {
            let mut updated = notification;
            updated.acknowledged_at = Some(event.acknowledged_at);
            // The tracker already applied the acknowledgment and the
            // completion flip never re-fires, so a failed save is logged and
            // the room events still go out.
            if let Err(err) = self.store.save_notification(&updated).await {
                error!(
                    notification_id = %updated.id,
                    error = %err,
                    "Failed to persist acknowledgment"
                );
            }
            if let Err(err) = self.store.save_execution(&outcome.instance).await {
                error!(
                    execution_id = %execution_id,
                    error = %err,
                    "Failed to persist execution state"
                );
            }

            self.broadcaster.publish(
                &execution_id,
                ExecutionEvent::StakeholderAcknowledged {
                    stakeholder_id: event.stakeholder_id.clone(),
                    stakeholder_name: event.stakeholder_name.clone(),
                    acknowledged_at: event.acknowledged_at,
                    response_time_minutes: event.response_time_minutes,
                },
            );

            if outcome.completed_now {
                let completed_at = outcome.instance.completed_at.unwrap_or(timestamp);
                self.broadcaster.publish(
                    &execution_id,
                    ExecutionEvent::CoordinationComplete {
                        coordination_time_minutes: minutes_between(
                            outcome.instance.started_at,
                            completed_at,
                        ),
                        acknowledged_count: outcome.snapshot.acknowledged_count,
                        total_stakeholders: outcome.snapshot.total_stakeholders,
                        acknowledgment_rate: outcome.snapshot.coordination_progress * 100.0,
                    },
                );
            }
        }

        Ok(AckReceipt {
            response_time_minutes: outcome
                .event
                .as_ref()
                .map(|e| e.response_time_minutes)
                .unwrap_or(0),
            coordination_complete: outcome.snapshot.coordination_complete,
        })
    }

    /// Current instance status plus the derived coordination snapshot.
    pub async fn status(&self, execution_id: &str) -> Result<ExecutionStatusView> {
        let instance = self.tracker.instance(execution_id).await?;
        let coordination = self.tracker.snapshot(execution_id).await?;
        Ok(ExecutionStatusView {
            status: instance.status,
            coordination,
        })
    }

    /// Abort an execution instance. In-flight dispatches finish on their own;
    /// their results are recorded but no longer influence the tracker.
    pub async fn abort(&self, execution_id: &str) -> Result<()> {
        let instance = self.tracker.abort(execution_id).await?;
        self.store.save_execution(&instance).await?;
        Ok(())
    }

    /// Join the event room for an execution instance.
    pub fn subscribe(&self, execution_id: &str) -> Result<RoomSubscription> {
        self.broadcaster.subscribe(execution_id)
    }

    /// Leave an event room.
    pub fn unsubscribe(&self, subscription: RoomSubscription) {
        self.broadcaster.unsubscribe(subscription)
    }

    /// Begin an outbound sync toward an external platform.
    #[instrument(skip(self))]
    pub async fn start_sync(
        &self,
        execution_id: &str,
        platform: &str,
        total_tasks: u32,
    ) -> Result<String> {
        // The instance must exist; sync status hangs off its room.
        let _ = self.tracker.instance(execution_id).await?;

        let operation = self
            .sync_tracker
            .start_sync(execution_id, platform, total_tasks)?;
        self.store.save_sync_operation(&operation).await?;
        self.publish_sync_status(&operation);
        Ok(operation.id)
    }

    /// Report progress on a live sync operation.
    pub async fn report_sync_progress(
        &self,
        sync_id: &str,
        tasks_synced: u32,
        progress: u8,
    ) -> Result<()> {
        let operation = self
            .sync_tracker
            .report_progress(sync_id, tasks_synced, progress)?;
        self.store.save_sync_operation(&operation).await?;
        self.publish_sync_status(&operation);
        Ok(())
    }

    /// Finish a sync operation successfully. Terminal.
    pub async fn complete_sync(
        &self,
        sync_id: &str,
        external_project_id: &str,
        tasks_synced: u32,
        duration_seconds: u64,
    ) -> Result<()> {
        let operation = self
            .sync_tracker
            .complete(sync_id, external_project_id, tasks_synced)?;
        self.store.save_sync_operation(&operation).await?;
        self.broadcaster.publish(
            &operation.execution_id,
            ExecutionEvent::SyncComplete {
                sync_id: operation.id.clone(),
                platform: operation.platform.clone(),
                external_project_id: external_project_id.to_string(),
                tasks_synced: operation.tasks_synced,
                sync_duration_seconds: duration_seconds,
            },
        );
        Ok(())
    }

    /// Mark a sync operation failed. Terminal; `retryable` only advises the
    /// caller whether a fresh `start_sync` makes sense.
    pub async fn fail_sync(
        &self,
        sync_id: &str,
        error_message: &str,
        error_code: Option<&str>,
        retryable: bool,
    ) -> Result<()> {
        let operation = self
            .sync_tracker
            .fail(sync_id, error_message, error_code, retryable)?;
        self.store.save_sync_operation(&operation).await?;
        self.broadcaster.publish(
            &operation.execution_id,
            ExecutionEvent::SyncError {
                sync_id: operation.id.clone(),
                platform: operation.platform.clone(),
                error_message: error_message.to_string(),
                error_code: error_code.map(str::to_string),
                retryable,
            },
        );
        Ok(())
    }

    /// Audit trail of sync attempts for an execution instance.
    pub fn sync_operations(&self, execution_id: &str) -> Vec<SyncOperation> {
        self.sync_tracker.operations_for(execution_id)
    }

    /// Drop all in-memory coordination state for an instance. Persisted
    /// records are untouched.
    pub fn purge(&self, execution_id: &str) -> bool {
        self.tracker.purge(execution_id)
    }

    fn publish_sync_status(&self, operation: &SyncOperation) {
        self.broadcaster.publish(
            &operation.execution_id,
            ExecutionEvent::SyncStatusUpdate {
                sync_id: operation.id.clone(),
                platform: operation.platform.clone(),
                status: operation.status.to_string(),
                progress: operation.progress,
                tasks_synced: operation.tasks_synced,
                total_tasks: operation.total_tasks,
            },
        );
    }
}

