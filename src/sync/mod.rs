pub mod tracker;
pub mod types;

pub use tracker::SyncStatusTracker;
pub use types::{SyncOperation, SyncStatus};
