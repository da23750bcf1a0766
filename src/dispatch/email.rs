//! Email channel adapter
//!
//! Delivers through an HTTP mail API (SendGrid-style JSON POST). SMTP is the
//! provider's business; this core only speaks HTTPS.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::coord::types::{ChannelKind, Priority, Stakeholder};
use crate::dispatch::channel::{
    classify_http_status, classify_transport_error, ChannelAdapter, DeliveryFailure,
    NotificationPayload,
};

/// Sends notification emails through an HTTP mail-API endpoint.
pub struct EmailAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_address: String,
}

impl EmailAdapter {
    pub fn new(endpoint: &str, api_key: &str, from_address: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            from_address: from_address.to_string(),
        }
    }

    fn subject(payload: &NotificationPayload) -> String {
        match payload.priority {
            Priority::Critical => format!("[CRITICAL] {}", payload.title),
            Priority::High => format!("[URGENT] {}", payload.title),
            _ => payload.title.clone(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(
        &self,
        recipient: &Stakeholder,
        payload: &NotificationPayload,
    ) -> std::result::Result<(), DeliveryFailure> {
        let address = recipient
            .email
            .as_deref()
            .ok_or_else(|| DeliveryFailure::terminal("recipient has no email address"))?;
        if !address.contains('@') || address.starts_with('@') || address.ends_with('@') {
            return Err(DeliveryFailure::terminal(format!(
                "malformed email address: {address}"
            )));
        }

        let body = json!({
            "from": self.from_address,
            "to": address,
            "subject": Self::subject(payload),
            "text": payload.message,
            "metadata": {
                "notification_id": payload.notification_id,
                "execution_id": payload.execution_id,
            },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if response.status().is_success() {
            debug!(
                notification_id = %payload.notification_id,
                recipient = %recipient.id,
                "Email accepted by mail API"
            );
            Ok(())
        } else {
            Err(classify_http_status(response.status()))
        }
    }
}
