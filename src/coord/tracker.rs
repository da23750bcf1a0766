//! Coordination tracker - authoritative acknowledgment state per execution
//!
//! One logical lock per execution instance serializes every mutation so the
//! completion flip happens exactly once no matter how acknowledgments race.
//! Different instances proceed fully in parallel.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::coord::types::{
    minutes_between, AcknowledgmentEvent, CoordinationSnapshot, ExecutionInstance, ExecutionStatus,
    Notification,
};
use crate::core::errors::{Result, RollcallError};

/// One roster position, keyed by its notification id.
#[derive(Debug, Clone)]
struct RosterSlot {
    stakeholder_id: String,
    stakeholder_name: String,
    /// Frozen at first acknowledgment; duplicates read this back unchanged.
    acknowledgment: Option<AcknowledgmentEvent>,
}

#[derive(Debug)]
struct InstanceState {
    instance: ExecutionInstance,
    slots: HashMap<String, RosterSlot>,
    acknowledged_count: usize,
}

impl InstanceState {
    fn snapshot(&self) -> CoordinationSnapshot {
        let total = self.slots.len();
        let progress = if total == 0 {
            0.0
        } else {
            self.acknowledged_count as f64 / total as f64
        };
        let end = self.instance.completed_at.unwrap_or_else(Utc::now);
        CoordinationSnapshot {
            acknowledged_count: self.acknowledged_count,
            total_stakeholders: total,
            coordination_progress: progress,
            elapsed_time_minutes: minutes_between(self.instance.started_at, end),
            coordination_complete: self.instance.status == ExecutionStatus::Complete,
        }
    }
}

/// Result of one acknowledgment submission.
#[derive(Debug, Clone)]
pub struct AckOutcome {
    /// The frozen acknowledgment record. None when the submission was
    /// absorbed against a terminal instance.
    pub event: Option<AcknowledgmentEvent>,
    pub snapshot: CoordinationSnapshot,
    /// Updated instance, for callers that persist it.
    pub instance: ExecutionInstance,
    /// True only on the acknowledgment that flipped the instance to complete.
    pub completed_now: bool,
    /// False for duplicate or absorbed submissions.
    pub applied: bool,
}

/// Tracks acknowledgment state for every live execution instance.
///
/// State is keyed by execution id; entries live from `create` until
/// `purge`, terminal or not.
#[derive(Debug, Default)]
pub struct CoordinationTracker {
    instances: DashMap<String, Arc<Mutex<InstanceState>>>,
}

impl CoordinationTracker {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
        }
    }

    /// Register a new execution instance with its roster notifications.
    pub fn create(&self, instance: &ExecutionInstance, notifications: &[Notification]) -> Result<()> {
        let slots: HashMap<String, RosterSlot> = notifications
            .iter()
            .map(|n| {
                (
                    n.id.clone(),
                    RosterSlot {
                        stakeholder_id: n.recipient_id.clone(),
                        stakeholder_name: n.recipient_name.clone(),
                        acknowledgment: None,
                    },
                )
            })
            .collect();

        match self.instances.entry(instance.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RollcallError::duplicate_instance(&instance.id))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(InstanceState {
                    instance: instance.clone(),
                    slots,
                    acknowledged_count: 0,
                })));
                info!(
                    execution_id = %instance.id,
                    stakeholders = notifications.len(),
                    "Created coordination tracker"
                );
                Ok(())
            }
        }
    }

    /// Record one stakeholder acknowledgment.
    ///
    /// Duplicate submissions return the previously frozen event without
    /// recounting; submissions against a failed instance are absorbed as
    /// no-ops to tolerate at-least-once upstream delivery.
    pub async fn record_acknowledgment(
        &self,
        execution_id: &str,
        notification_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AckOutcome> {
        let state = self.handle(execution_id)?;
        let mut state = state.lock().await;

        if !state.slots.contains_key(notification_id) {
            return Err(RollcallError::unknown_notification(notification_id));
        }

        // Duplicate: hand back the frozen record, count untouched.
        if let Some(frozen) = state
            .slots
            .get(notification_id)
            .and_then(|s| s.acknowledgment.clone())
        {
            debug!(
                execution_id,
                notification_id, "Duplicate acknowledgment absorbed"
            );
            return Ok(AckOutcome {
                event: Some(frozen),
                snapshot: state.snapshot(),
                instance: state.instance.clone(),
                completed_now: false,
                applied: false,
            });
        }

        // A late acknowledgment for an instance that was aborted (or force
        // closed) mutates nothing.
        if state.instance.status.is_terminal() {
            warn!(
                execution_id,
                notification_id,
                status = %state.instance.status,
                "Acknowledgment against terminal instance absorbed"
            );
            return Ok(AckOutcome {
                event: None,
                snapshot: state.snapshot(),
                instance: state.instance.clone(),
                completed_now: false,
                applied: false,
            });
        }

        let response_time_minutes = minutes_between(state.instance.started_at, timestamp);
        let slot = state
            .slots
            .get_mut(notification_id)
            .ok_or_else(|| RollcallError::unknown_notification(notification_id))?;
        let event = AcknowledgmentEvent {
            stakeholder_id: slot.stakeholder_id.clone(),
            stakeholder_name: slot.stakeholder_name.clone(),
            acknowledged_at: timestamp,
            response_time_minutes,
        };
        slot.acknowledgment = Some(event.clone());
        state.acknowledged_count += 1;

        let completed_now = state.acknowledged_count == state.slots.len();
        if completed_now {
            state.instance.status = ExecutionStatus::Complete;
            state.instance.completed_at = Some(timestamp);
            info!(
                execution_id,
                total = state.slots.len(),
                "Coordination complete"
            );
        } else {
            debug!(
                execution_id,
                acknowledged = state.acknowledged_count,
                total = state.slots.len(),
                "Acknowledgment recorded"
            );
        }

        Ok(AckOutcome {
            event: Some(event),
            snapshot: state.snapshot(),
            instance: state.instance.clone(),
            completed_now,
            applied: true,
        })
    }

    /// Pure read of the current coordination state.
    pub async fn snapshot(&self, execution_id: &str) -> Result<CoordinationSnapshot> {
        let state = self.handle(execution_id)?;
        let state = state.lock().await;
        Ok(state.snapshot())
    }

    /// Current instance record.
    pub async fn instance(&self, execution_id: &str) -> Result<ExecutionInstance> {
        let state = self.handle(execution_id)?;
        let state = state.lock().await;
        Ok(state.instance.clone())
    }

    /// Flip the tracker's per-instance state to coordinating after the
    /// activation fan-out finished.
    pub async fn mark_coordinating(&self, execution_id: &str) -> Result<ExecutionInstance> {
        let state = self.handle(execution_id)?;
        let mut state = state.lock().await;
        if state.instance.status == ExecutionStatus::Started {
            state.instance.status = ExecutionStatus::Coordinating;
        }
        Ok(state.instance.clone())
    }

    /// Abort an execution instance. Terminal; later acknowledgments and late
    /// dispatch results become no-ops.
    pub async fn abort(&self, execution_id: &str) -> Result<ExecutionInstance> {
        let state = self.handle(execution_id)?;
        let mut state = state.lock().await;
        if state.instance.status == ExecutionStatus::Complete {
            return Err(RollcallError::instance_closed(
                execution_id,
                state.instance.status.as_str(),
            ));
        }
        if state.instance.status != ExecutionStatus::Failed {
            state.instance.status = ExecutionStatus::Failed;
            state.instance.completed_at = Some(Utc::now());
            info!(execution_id, "Execution instance aborted");
        }
        Ok(state.instance.clone())
    }

    /// Drop all state for an instance. Callers decide retention; nothing is
    /// purged automatically at terminal status.
    pub fn purge(&self, execution_id: &str) -> bool {
        self.instances.remove(execution_id).is_some()
    }

    pub fn contains(&self, execution_id: &str) -> bool {
        self.instances.contains_key(execution_id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn handle(&self, execution_id: &str) -> Result<Arc<Mutex<InstanceState>>> {
        self.instances
            .get(execution_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RollcallError::unknown_instance(execution_id))
    }
}
