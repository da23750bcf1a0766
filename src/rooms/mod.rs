pub mod broadcaster;
pub mod events;

pub use broadcaster::{EventBroadcaster, RoomSubscription};
pub use events::{EventEnvelope, ExecutionEvent};
