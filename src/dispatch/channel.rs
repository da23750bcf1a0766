//! Channel adapter seam
//!
//! One adapter per delivery channel kind. Adapters own their formatting and
//! classify every failure as retryable or terminal; the dispatcher never
//! second-guesses that classification.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::coord::types::{ChannelKind, Notification, Priority, Stakeholder};

/// A classified per-channel send failure.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub message: String,
    /// True when a fresh dispatch attempt is sensible (transient transport
    /// trouble); false for permanent problems like a malformed address.
    pub retryable: bool,
}

impl DeliveryFailure {
    pub fn terminal<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

impl std::fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// What an adapter actually gets to send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification_id: String,
    pub execution_id: Option<String>,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id.clone(),
            execution_id: notification.execution_id.clone(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            priority: notification.priority,
            metadata: notification.metadata.clone(),
            created_at: notification.created_at,
        }
    }
}

/// Polymorphic send over one channel kind. Selected by the notification's
/// requested-channels set, not by inheritance.
#[async_trait]
pub trait ChannelAdapter: Send + Sync + 'static {
    fn kind(&self) -> ChannelKind;

    async fn send(
        &self,
        recipient: &Stakeholder,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), DeliveryFailure>;
}

/// Outcome of one channel attempt inside a dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub success: bool,
    pub error: Option<String>,
    pub retryable: Option<bool>,
}

impl ChannelOutcome {
    pub fn ok(channel: ChannelKind) -> Self {
        Self {
            channel,
            success: true,
            error: None,
            retryable: None,
        }
    }

    pub fn failed(channel: ChannelKind, failure: DeliveryFailure) -> Self {
        Self {
            channel,
            success: false,
            error: Some(failure.message),
            retryable: Some(failure.retryable),
        }
    }
}

/// Map an HTTP response status to a classified failure. 429 and 5xx are
/// transient; every other non-success status is the sender's problem.
pub(crate) fn classify_http_status(status: reqwest::StatusCode) -> DeliveryFailure {
    if status.as_u16() == 429 || status.is_server_error() {
        DeliveryFailure::retryable(format!("HTTP {status}"))
    } else {
        DeliveryFailure::terminal(format!("HTTP {status}"))
    }
}

/// Map a reqwest transport error; network-level failures are retryable.
pub(crate) fn classify_transport_error(err: &reqwest::Error) -> DeliveryFailure {
    if err.is_builder() || err.is_request() && err.url().is_none() {
        DeliveryFailure::terminal(err.to_string())
    } else {
        DeliveryFailure::retryable(err.to_string())
    }
}
