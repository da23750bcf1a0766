//! Notification dispatcher
//!
//! Fans one notification out to every requested channel, each under its own
//! bounded timeout, and reports per-channel outcomes. Stateless per call; no
//! built-in retry - a caller that wants another attempt issues a fresh
//! dispatch.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::coord::types::{ChannelKind, Notification, Stakeholder};
use crate::dispatch::channel::{
    ChannelAdapter, ChannelOutcome, DeliveryFailure, NotificationPayload,
};

/// Aggregate result of one dispatch call.
///
/// Callers must not assume all-or-nothing delivery: `success` means at least
/// one channel got through, and `outcomes` carries the full per-channel list.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub notification_id: String,
    pub outcomes: Vec<ChannelOutcome>,
    pub sent_at: Option<DateTime<Utc>>,
    pub success: bool,
}

/// Routes notifications to registered channel adapters.
pub struct Dispatcher {
    adapters: HashMap<ChannelKind, Arc<dyn ChannelAdapter>>,
    channel_timeout: Duration,
}

impl Dispatcher {
    pub fn new(channel_timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            channel_timeout,
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn has_adapter(&self, kind: ChannelKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Deliver a notification through every channel it requests.
    ///
    /// Channels run concurrently. A channel whose adapter exceeds the
    /// configured timeout is reported as a retryable failure for that
    /// channel only.
    #[instrument(skip(self, notification, recipient), fields(notification_id = %notification.id))]
    pub async fn dispatch(
        &self,
        notification: &Notification,
        recipient: &Stakeholder,
    ) -> DispatchReport {
        let payload = NotificationPayload::from_notification(notification);

        let attempts = notification.channels.iter().map(|&kind| {
            let payload = &payload;
            async move {
                match self.adapters.get(&kind) {
                    None => ChannelOutcome::failed(
                        kind,
                        DeliveryFailure::terminal(format!(
                            "no adapter registered for channel {kind}"
                        )),
                    ),
                    Some(adapter) => {
                        match tokio::time::timeout(
                            self.channel_timeout,
                            adapter.send(recipient, payload),
                        )
                        .await
                        {
                            Ok(Ok(())) => ChannelOutcome::ok(kind),
                            Ok(Err(failure)) => ChannelOutcome::failed(kind, failure),
                            Err(_) => ChannelOutcome::failed(
                                kind,
                                DeliveryFailure::retryable(format!(
                                    "channel send timed out after {:?}",
                                    self.channel_timeout
                                )),
                            ),
                        }
                    }
                }
            }
        });

        let outcomes: Vec<ChannelOutcome> = join_all(attempts).await;
        let success = outcomes.iter().any(|o| o.success);
        let sent_at = success.then(Utc::now);

        if success {
            info!(
                recipient = %recipient.id,
                channels = outcomes.len(),
                delivered = outcomes.iter().filter(|o| o.success).count(),
                "Notification dispatched"
            );
        } else {
            warn!(
                recipient = %recipient.id,
                channels = outcomes.len(),
                "All channels failed for notification"
            );
        }

        DispatchReport {
            notification_id: notification.id.clone(),
            outcomes,
            sent_at,
            success,
        }
    }
}
