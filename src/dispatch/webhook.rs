//! Chat-webhook channel adapter
//!
//! Posts a typed JSON payload to the recipient's webhook URL (Slack/Teams
//! style incoming webhook).

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::coord::types::{ChannelKind, Stakeholder};
use crate::dispatch::channel::{
    classify_http_status, classify_transport_error, ChannelAdapter, DeliveryFailure,
    NotificationPayload,
};

/// Body posted to the webhook URL.
#[derive(Debug, Clone, Serialize)]
struct WebhookBody<'a> {
    event: &'static str,
    notification_id: &'a str,
    execution_id: Option<&'a str>,
    title: &'a str,
    text: &'a str,
    priority: crate::coord::types::Priority,
}

/// Sends notifications to per-recipient chat webhook URLs.
pub struct WebhookAdapter {
    client: reqwest::Client,
    /// Extra headers applied to every request (auth tokens, routing hints).
    headers: HashMap<String, String>,
}

impl WebhookAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(
        &self,
        recipient: &Stakeholder,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), DeliveryFailure> {
        let url = recipient
            .webhook_url
            .as_deref()
            .ok_or_else(|| DeliveryFailure::terminal("recipient has no webhook url"))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(DeliveryFailure::terminal(format!(
                "invalid webhook url: {url}"
            )));
        }

        let body = WebhookBody {
            event: "notification.created",
            notification_id: &payload.notification_id,
            execution_id: payload.execution_id.as_deref(),
            title: &payload.title,
            text: &payload.message,
            priority: payload.priority,
        };

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Rollcall-Event", "notification.created");
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if response.status().is_success() {
            debug!(
                notification_id = %payload.notification_id,
                recipient = %recipient.id,
                "Webhook delivered"
            );
            Ok(())
        } else {
            Err(classify_http_status(response.status()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::types::Priority;
    use chrono::Utc;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            notification_id: "ntf_1".into(),
            execution_id: Some("exec_1".into()),
            title: "Playbook activated".into(),
            message: "Please acknowledge".into(),
            priority: Priority::Normal,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_url_is_terminal() {
        let adapter = WebhookAdapter::new();
        let recipient = Stakeholder {
            id: "stk_1".into(),
            name: "No Hook".into(),
            email: None,
            webhook_url: None,
            channels: vec![ChannelKind::Webhook],
        };
        let err = adapter.send(&recipient, &payload()).await.unwrap_err();
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_bad_scheme_is_terminal() {
        let adapter = WebhookAdapter::new();
        let recipient = Stakeholder {
            id: "stk_1".into(),
            name: "Bad Hook".into(),
            email: None,
            webhook_url: Some("ftp://hooks.example.com/x".into()),
            channels: vec![ChannelKind::Webhook],
        };
        let err = adapter.send(&recipient, &payload()).await.unwrap_err();
        assert!(!err.retryable);
    }
}
