//! End-to-end coordination tests
//!
//! Drives the orchestrator through activation, acknowledgment and completion
//! using mock channel adapters, asserting the derived state and the events
//! observed through the room subscriptions.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rollcall::dispatch::channel::{ChannelAdapter, DeliveryFailure, NotificationPayload};
use rollcall::{
    ActivationRequest, ChannelKind, CoordinatorConfig, ExecutionEvent, ExecutionInstance,
    ExecutionStatus, MemoryStore, Notification, Orchestrator, OrchestratorBuilder, Priority,
    RollcallError, Stakeholder, Store, SyncOperation,
};

/// Adapter that records every send and always succeeds.
struct RecordingAdapter {
    kind: ChannelKind,
    sends: Arc<AtomicUsize>,
}

#[async_trait]
impl ChannelAdapter for RecordingAdapter {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(
        &self,
        _recipient: &Stakeholder,
        _payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailure> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Adapter that parks inside `send` until released, handing the payload's
/// notification id to the test the way a delivered webhook would.
struct GatedAdapter {
    kind: ChannelKind,
    seen: tokio::sync::mpsc::UnboundedSender<String>,
    gate: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl ChannelAdapter for GatedAdapter {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(
        &self,
        _recipient: &Stakeholder,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailure> {
        let _ = self.seen.send(payload.notification_id.clone());
        self.gate.notified().await;
        Ok(())
    }
}

/// Adapter that always fails, terminally.
struct BrokenAdapter {
    kind: ChannelKind,
}

#[async_trait]
impl ChannelAdapter for BrokenAdapter {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(
        &self,
        _recipient: &Stakeholder,
        _payload: &NotificationPayload,
    ) -> Result<(), DeliveryFailure> {
        Err(DeliveryFailure::terminal("provider rejected the message"))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn stakeholder(n: usize, channels: Vec<ChannelKind>) -> Stakeholder {
    Stakeholder {
        id: format!("stk_{n}"),
        name: format!("Stakeholder {n}"),
        email: Some(format!("s{n}@example.com")),
        webhook_url: Some(format!("https://hooks.example.com/s{n}")),
        channels,
    }
}

fn request(roster: Vec<Stakeholder>) -> ActivationRequest {
    ActivationRequest {
        playbook_id: "pb_outage".to_string(),
        scenario_id: "sc_db_failover".to_string(),
        organization_id: Some("org_1".to_string()),
        roster,
        title: "Playbook activated: database failover".to_string(),
        message: "Please acknowledge you are responding".to_string(),
        priority: Priority::High,
    }
}

fn build_orchestrator(sends: Arc<AtomicUsize>) -> Orchestrator {
    OrchestratorBuilder::new()
        .store(Arc::new(MemoryStore::new()))
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: sends.clone(),
        }))
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Webhook,
            sends,
        }))
        .build()
        .unwrap()
}

/// Full lifecycle: three stakeholders acknowledge one by one, the third
/// acknowledgment flips the instance to complete and emits the completion
/// event exactly once.
#[tokio::test]
async fn test_full_coordination_lifecycle() -> anyhow::Result<()> {
    init_tracing();
    let sends = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = OrchestratorBuilder::new()
        .store(store.clone())
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: sends.clone(),
        }))
        .build()?;

    let roster: Vec<Stakeholder> = (0..3)
        .map(|n| stakeholder(n, vec![ChannelKind::Email]))
        .collect();
    let execution_id = orchestrator.activate(request(roster)).await?;
    assert_eq!(sends.load(Ordering::SeqCst), 3);

    let view = orchestrator.status(&execution_id).await?;
    assert_eq!(view.status, ExecutionStatus::Coordinating);
    assert_eq!(view.coordination.total_stakeholders, 3);
    assert_eq!(view.coordination.acknowledged_count, 0);

    let mut subscription = orchestrator.subscribe(&execution_id)?;

    // Pull the notification ids back out through the dispatch records the
    // orchestrator persisted.
    let notification_ids = notification_ids_for(&store, &execution_id).await;
    assert_eq!(notification_ids.len(), 3);

    let base = Utc::now();
    let mut receipts = Vec::new();
    for (i, ntf_id) in notification_ids.iter().enumerate() {
        let receipt = orchestrator
            .acknowledge(ntf_id, base + Duration::minutes(i as i64 + 1))
            .await?;
        assert_eq!(receipt.coordination_complete, i == 2);
        receipts.push(receipt);
    }

    let view = orchestrator.status(&execution_id).await?;
    assert_eq!(view.status, ExecutionStatus::Complete);
    assert_eq!(view.coordination.acknowledged_count, 3);
    assert!((view.coordination.coordination_progress - 1.0).abs() < f64::EPSILON);

    // Re-acknowledging after completion changes nothing: same frozen response
    // time, unchanged count, and no extra room event below
    let replay = orchestrator
        .acknowledge(&notification_ids[0], base + Duration::minutes(90))
        .await?;
    assert!(replay.coordination_complete);
    assert_eq!(
        replay.response_time_minutes,
        receipts[0].response_time_minutes
    );
    let view = orchestrator.status(&execution_id).await?;
    assert_eq!(view.coordination.acknowledged_count, 3);

    // Room saw three acknowledgment events then exactly one completion
    let mut acks = 0;
    let mut completions = 0;
    while let Some(envelope) = subscription.try_recv() {
        match envelope.event {
            ExecutionEvent::StakeholderAcknowledged { .. } => acks += 1,
            ExecutionEvent::CoordinationComplete {
                acknowledgment_rate,
                acknowledged_count,
                total_stakeholders,
                ..
            } => {
                completions += 1;
                assert_eq!(acknowledged_count, 3);
                assert_eq!(total_stakeholders, 3);
                assert!((acknowledgment_rate - 100.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(acks, 3);
    assert_eq!(completions, 1);
    Ok(())
}

/// Re-submitting an acknowledgment changes nothing and emits no second event.
#[tokio::test]
async fn test_duplicate_acknowledgment_absorbed() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = OrchestratorBuilder::new()
        .store(store.clone())
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: Arc::new(AtomicUsize::new(0)),
        }))
        .build()
        .unwrap();

    let roster: Vec<Stakeholder> = (0..2)
        .map(|n| stakeholder(n, vec![ChannelKind::Email]))
        .collect();
    let execution_id = orchestrator.activate(request(roster)).await.unwrap();
    let notification_ids = notification_ids_for(&store, &execution_id).await;

    let mut subscription = orchestrator.subscribe(&execution_id).unwrap();

    let ts = Utc::now() + Duration::minutes(5);
    let first = orchestrator
        .acknowledge(&notification_ids[0], ts)
        .await
        .unwrap();
    let again = orchestrator
        .acknowledge(&notification_ids[0], ts + Duration::minutes(30))
        .await
        .unwrap();

    // The frozen response time comes back unchanged
    assert_eq!(again.response_time_minutes, first.response_time_minutes);
    assert!(!again.coordination_complete);

    let view = orchestrator.status(&execution_id).await.unwrap();
    assert_eq!(view.coordination.acknowledged_count, 1);

    // Only one event reached the room
    let mut events = 0;
    while subscription.try_recv().is_some() {
        events += 1;
    }
    assert_eq!(events, 1);
}

/// A stakeholder whose channel delivery failed still blocks completion; the
/// activation itself succeeds.
#[tokio::test]
async fn test_partial_delivery_does_not_abort_activation() {
    let sends = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = OrchestratorBuilder::new()
        .store(store.clone())
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: sends.clone(),
        }))
        .adapter(Arc::new(BrokenAdapter {
            kind: ChannelKind::Webhook,
        }))
        .build()
        .unwrap();

    let roster = vec![
        stakeholder(0, vec![ChannelKind::Email]),
        stakeholder(1, vec![ChannelKind::Webhook]),
    ];
    let execution_id = orchestrator.activate(request(roster)).await.unwrap();

    let view = orchestrator.status(&execution_id).await.unwrap();
    assert_eq!(view.status, ExecutionStatus::Coordinating);
    assert_eq!(view.coordination.total_stakeholders, 2);
    assert_eq!(sends.load(Ordering::SeqCst), 1);

    // The failed recipient's notification was never stamped sent
    let notification_ids = notification_ids_for(&store, &execution_id).await;
    let mut sent = 0;
    for id in &notification_ids {
        let notification = load_notification(&store, id).await;
        if notification.sent_at.is_some() {
            sent += 1;
        }
    }
    assert_eq!(sent, 1);
}

/// Acknowledgments racing for the final slot complete the instance once.
#[tokio::test]
async fn test_concurrent_acknowledgments_complete_once() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(
        OrchestratorBuilder::new()
            .store(store.clone())
            .adapter(Arc::new(RecordingAdapter {
                kind: ChannelKind::Email,
                sends: Arc::new(AtomicUsize::new(0)),
            }))
            .build()
            .unwrap(),
    );

    let roster: Vec<Stakeholder> = (0..6)
        .map(|n| stakeholder(n, vec![ChannelKind::Email]))
        .collect();
    let execution_id = orchestrator.activate(request(roster)).await.unwrap();
    let notification_ids = notification_ids_for(&store, &execution_id).await;

    let handles: Vec<_> = notification_ids
        .into_iter()
        .map(|ntf_id| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.acknowledge(&ntf_id, Utc::now()).await.unwrap() })
        })
        .collect();

    let receipts = futures::future::join_all(handles).await;
    let completions = receipts
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|r| r.coordination_complete)
        .count();
    // Every receipt at or after the completing one reports complete, but the
    // tracker flipped exactly once
    assert!(completions >= 1);

    let view = orchestrator.status(&execution_id).await.unwrap();
    assert_eq!(view.status, ExecutionStatus::Complete);
    assert_eq!(view.coordination.acknowledged_count, 6);
}

/// Aborting stops coordination; late acknowledgments are absorbed silently.
#[tokio::test]
async fn test_abort_then_late_acknowledgment() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = OrchestratorBuilder::new()
        .store(store.clone())
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: Arc::new(AtomicUsize::new(0)),
        }))
        .build()
        .unwrap();

    let roster: Vec<Stakeholder> = (0..2)
        .map(|n| stakeholder(n, vec![ChannelKind::Email]))
        .collect();
    let execution_id = orchestrator.activate(request(roster)).await.unwrap();
    let notification_ids = notification_ids_for(&store, &execution_id).await;

    orchestrator.abort(&execution_id).await.unwrap();
    let mut subscription = orchestrator.subscribe(&execution_id).unwrap();

    let receipt = orchestrator
        .acknowledge(&notification_ids[0], Utc::now())
        .await
        .unwrap();
    assert!(!receipt.coordination_complete);

    let view = orchestrator.status(&execution_id).await.unwrap();
    assert_eq!(view.status, ExecutionStatus::Failed);
    assert_eq!(view.coordination.acknowledged_count, 0);

    // Nothing was published for the absorbed acknowledgment
    assert!(subscription.try_recv().is_none());
}

/// An acknowledgment arriving while the fan-out is still in flight must
/// survive the dispatch-outcome save.
#[tokio::test]
async fn test_acknowledgment_during_fanout_survives_dispatch_save() {
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    let gate = Arc::new(tokio::sync::Notify::new());
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(
        OrchestratorBuilder::new()
            .store(store.clone())
            .adapter(Arc::new(GatedAdapter {
                kind: ChannelKind::Webhook,
                seen: seen_tx,
                gate: gate.clone(),
            }))
            .build()
            .unwrap(),
    );

    let activation = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .activate(request(vec![stakeholder(0, vec![ChannelKind::Webhook])]))
                .await
        })
    };

    // The adapter handed out the notification id; acknowledge while its send
    // is still parked
    let ntf_id = seen_rx.recv().await.unwrap();
    let receipt = orchestrator.acknowledge(&ntf_id, Utc::now()).await.unwrap();
    assert!(receipt.coordination_complete);

    gate.notify_one();
    let execution_id = activation.await.unwrap().unwrap();

    let stored = load_notification(&store, &ntf_id).await;
    assert!(stored.acknowledged_at.is_some());
    assert!(stored.sent_at.is_some());

    let view = orchestrator.status(&execution_id).await.unwrap();
    assert_eq!(view.status, ExecutionStatus::Complete);
}

/// Store wrapper whose saves can be made to fail mid-test.
struct FlakyStore {
    inner: MemoryStore,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl FlakyStore {
    fn save_error(&self, operation: &str) -> Option<RollcallError> {
        self.fail_saves
            .load(Ordering::SeqCst)
            .then(|| RollcallError::store(operation, "disk full"))
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn load_notification(&self, id: &str) -> rollcall::Result<Notification> {
        self.inner.load_notification(id).await
    }

    async fn save_notification(&self, notification: &Notification) -> rollcall::Result<()> {
        if let Some(err) = self.save_error("save_notification") {
            return Err(err);
        }
        self.inner.save_notification(notification).await
    }

    async fn load_execution(&self, id: &str) -> rollcall::Result<ExecutionInstance> {
        self.inner.load_execution(id).await
    }

    async fn save_execution(&self, execution: &ExecutionInstance) -> rollcall::Result<()> {
        if let Some(err) = self.save_error("save_execution") {
            return Err(err);
        }
        self.inner.save_execution(execution).await
    }

    async fn load_sync_operation(&self, id: &str) -> rollcall::Result<SyncOperation> {
        self.inner.load_sync_operation(id).await
    }

    async fn save_sync_operation(&self, operation: &SyncOperation) -> rollcall::Result<()> {
        self.inner.save_sync_operation(operation).await
    }
}

/// A save failure on the completing acknowledgment must not swallow the room
/// events; the tracker has already flipped and never re-fires.
#[tokio::test]
async fn test_completion_event_survives_save_failure() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        fail_saves: std::sync::atomic::AtomicBool::new(false),
    });
    let orchestrator = OrchestratorBuilder::new()
        .store(store.clone())
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: Arc::new(AtomicUsize::new(0)),
        }))
        .build()
        .unwrap();

    let execution_id = orchestrator
        .activate(request(vec![stakeholder(0, vec![ChannelKind::Email])]))
        .await
        .unwrap();
    let notification_ids = store.inner.notification_ids_for(&execution_id);

    let mut subscription = orchestrator.subscribe(&execution_id).unwrap();
    store.fail_saves.store(true, Ordering::SeqCst);

    let receipt = orchestrator
        .acknowledge(&notification_ids[0], Utc::now())
        .await
        .unwrap();
    assert!(receipt.coordination_complete);

    let mut kinds = Vec::new();
    while let Some(envelope) = subscription.try_recv() {
        kinds.push(envelope.event.kind());
    }
    assert_eq!(kinds, vec!["stakeholder-acknowledged", "coordination-complete"]);
}

/// Roster validation happens before any instance state is created.
#[tokio::test]
async fn test_empty_roster_rejected() {
    let orchestrator = build_orchestrator(Arc::new(AtomicUsize::new(0)));
    let err = orchestrator.activate(request(vec![])).await.unwrap_err();
    assert!(matches!(err, RollcallError::Validation { .. }));
}

#[tokio::test]
async fn test_oversized_roster_rejected() {
    let mut config = CoordinatorConfig::default();
    config.max_roster_size = 2;
    let orchestrator = OrchestratorBuilder::new()
        .config(config)
        .adapter(Arc::new(RecordingAdapter {
            kind: ChannelKind::Email,
            sends: Arc::new(AtomicUsize::new(0)),
        }))
        .build()
        .unwrap();

    let roster: Vec<Stakeholder> = (0..3)
        .map(|n| stakeholder(n, vec![ChannelKind::Email]))
        .collect();
    let err = orchestrator.activate(request(roster)).await.unwrap_err();
    assert!(matches!(err, RollcallError::ResourceExhausted { .. }));
}

#[tokio::test]
async fn test_unknown_notification_rejected() {
    let orchestrator = build_orchestrator(Arc::new(AtomicUsize::new(0)));
    let err = orchestrator
        .acknowledge("ntf_missing", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, RollcallError::UnknownNotification { .. }));
}

async fn notification_ids_for(store: &Arc<MemoryStore>, execution_id: &str) -> Vec<String> {
    store.notification_ids_for(execution_id)
}

async fn load_notification(store: &Arc<MemoryStore>, id: &str) -> Notification {
    store.load_notification(id).await.unwrap()
}
