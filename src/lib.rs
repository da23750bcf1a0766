// Core infrastructure modules
pub mod core;

// Coordination engine: activation, acknowledgment tracking, completion
pub mod coord;
// Channel adapters and concurrent notification fan-out
pub mod dispatch;
// Per-execution event rooms
pub mod rooms;
// Persistence seam
pub mod store;
// External platform sync status machine
pub mod sync;

// Re-exports for convenience
pub use core::config::CoordinatorConfig;
pub use core::errors::{Result, RollcallError};
pub use coord::{
    AckReceipt, ActivationRequest, ChannelKind, CoordinationSnapshot, ExecutionInstance,
    ExecutionStatus, ExecutionStatusView, Notification, Orchestrator, OrchestratorBuilder,
    Priority, Stakeholder,
};
pub use dispatch::{ChannelAdapter, ChannelOutcome, DeliveryFailure, Dispatcher, NotificationPayload};
pub use rooms::{EventBroadcaster, EventEnvelope, ExecutionEvent, RoomSubscription};
pub use store::{MemoryStore, Store};
pub use sync::{SyncOperation, SyncStatus, SyncStatusTracker};
