//! Event broadcaster
//!
//! One room per execution instance; each room wraps a bounded broadcast
//! channel. Delivery is best-effort at-most-once to currently connected
//! subscribers: no replay buffer, and a slow subscriber loses events rather
//! than stalling the publisher. Reconnecting observers re-query the snapshot
//! instead of expecting history.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

use crate::core::errors::{Result, RollcallError};
use crate::rooms::events::{EventEnvelope, ExecutionEvent};

/// Handle held by one subscriber of one room. Dropping it leaves the room.
#[derive(Debug)]
pub struct RoomSubscription {
    execution_id: String,
    receiver: broadcast::Receiver<EventEnvelope>,
}

impl RoomSubscription {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Next event for this room.
    ///
    /// Events missed while lagging are skipped silently (at-most-once
    /// contract). Returns None once the room is gone and drained.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    trace!(
                        execution_id = %self.execution_id,
                        missed,
                        "Subscriber lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Routes state-change events to the subscribers of each execution instance.
#[derive(Debug)]
pub struct EventBroadcaster {
    rooms: DashMap<String, broadcast::Sender<EventEnvelope>>,
    /// Serializes room creation so the cap check and the insert are atomic.
    create_lock: std::sync::Mutex<()>,
    buffer_size: usize,
    max_rooms: usize,
}

impl EventBroadcaster {
    pub fn new(buffer_size: usize, max_rooms: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            create_lock: std::sync::Mutex::new(()),
            buffer_size,
            max_rooms,
        }
    }

    /// Join the room for an execution instance, creating it lazily.
    ///
    /// A subscriber may hold subscriptions to any number of rooms. Events
    /// published before this call are not replayed.
    pub fn subscribe(&self, execution_id: &str) -> Result<RoomSubscription> {
        if let Some(sender) = self.rooms.get(execution_id) {
            return Ok(RoomSubscription {
                execution_id: execution_id.to_string(),
                receiver: sender.subscribe(),
            });
        }

        let _guard = self
            .create_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !self.rooms.contains_key(execution_id) && self.rooms.len() >= self.max_rooms {
            return Err(RollcallError::resource_exhausted(
                "rooms",
                self.rooms.len() as u64,
                self.max_rooms as u64,
            ));
        }

        let receiver = self
            .rooms
            .entry(execution_id.to_string())
            .or_insert_with(|| {
                debug!(execution_id, "Room created");
                broadcast::channel(self.buffer_size).0
            })
            .subscribe();

        Ok(RoomSubscription {
            execution_id: execution_id.to_string(),
            receiver,
        })
    }

    /// Leave a room. Empty rooms are garbage-collected; rooms with remaining
    /// subscribers stay open even after the instance went terminal, so the
    /// final completion event can still be observed.
    pub fn unsubscribe(&self, subscription: RoomSubscription) {
        let execution_id = subscription.execution_id.clone();
        drop(subscription);
        self.gc_room(&execution_id);
    }

    /// Publish an event to every current subscriber of the room.
    ///
    /// Returns how many subscribers the event was handed to. Publishing to a
    /// missing or empty room is a no-op, never an error.
    #[instrument(skip(self, event), fields(execution_id, kind = event.kind()))]
    pub fn publish(&self, execution_id: &str, event: ExecutionEvent) -> usize {
        let envelope = EventEnvelope::new(execution_id, event);
        let delivered = match self.rooms.get(execution_id) {
            Some(sender) => sender.send(envelope).unwrap_or(0),
            None => 0,
        };
        trace!(delivered, "Event published");
        self.gc_room(execution_id);
        delivered
    }

    pub fn subscriber_count(&self, execution_id: &str) -> usize {
        self.rooms
            .get(execution_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn gc_room(&self, execution_id: &str) {
        let removed = self
            .rooms
            .remove_if(execution_id, |_, sender| sender.receiver_count() == 0);
        if removed.is_some() {
            debug!(execution_id, "Empty room garbage-collected");
        }
    }
}
