use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::errors::{Result, RollcallError};

/// Tunables for the coordination engine.
///
/// Applies to every execution instance managed by one orchestrator; there is
/// no per-instance override.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CoordinatorConfig {
    /// Bound on a single channel adapter call. Exceeding it is reported as a
    /// retryable per-channel failure, never a dispatch crash.
    pub channel_timeout_secs: u64,
    /// Buffer capacity of a room's broadcast channel. Laggards lose events
    /// rather than stalling the publisher.
    pub room_buffer_size: usize,
    /// Ceiling on concurrently open rooms.
    pub max_rooms: usize,
    /// Ceiling on stakeholders in a single activation roster.
    pub max_roster_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            channel_timeout_secs: 10,
            room_buffer_size: 256,
            max_rooms: 10_000,
            max_roster_size: 500,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_timeout_secs == 0 {
            return Err(RollcallError::configuration(
                "channel_timeout_secs must be greater than 0",
            ));
        }
        if self.channel_timeout_secs > 300 {
            return Err(RollcallError::configuration(
                "channel_timeout_secs cannot exceed 5 minutes",
            ));
        }
        if self.room_buffer_size == 0 {
            return Err(RollcallError::configuration(
                "room_buffer_size must be greater than 0",
            ));
        }
        if self.max_rooms == 0 {
            return Err(RollcallError::configuration(
                "max_rooms must be greater than 0",
            ));
        }
        if self.max_roster_size == 0 {
            return Err(RollcallError::configuration(
                "max_roster_size must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }
}
