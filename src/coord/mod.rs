pub mod builder;
pub mod orchestrator;
pub mod tracker;
pub mod types;

pub use builder::OrchestratorBuilder;
pub use orchestrator::{AckReceipt, ActivationRequest, ExecutionStatusView, Orchestrator};
pub use tracker::{AckOutcome, CoordinationTracker};
pub use types::{
    AcknowledgmentEvent, ChannelKind, CoordinationSnapshot, ExecutionInstance, ExecutionStatus,
    Notification, Priority, Stakeholder,
};
