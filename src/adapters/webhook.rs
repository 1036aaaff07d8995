//! Webhook notification channel.
//!
//! Endpoint: POST <url>
//! Auth: optional Bearer token

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::Notifier;

/// Delivers notifications by POSTing JSON to a mail relay or similar hook
pub struct WebhookNotifier {
    endpoint: String,
    token: Option<String>,
    from: String,
    client: reqwest::Client,
}

/// Body of the webhook request
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, from: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token,
            from: from.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        let payload = NotificationPayload {
            from: &self.from,
            to: address,
            subject,
            body,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach notification webhook")?;

        let status = response.status();
        if status.is_success() {
            // 202 Accepted is expected from queueing relays
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Notification webhook error ({}): {}", status, text.trim())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serialization() {
        let payload = NotificationPayload {
            from: "noreply@example.com",
            to: "jane@example.com",
            subject: "Your Resume Analysis Results",
            body: "Score: 82",
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["to"], "jane@example.com");
        assert_eq!(json["subject"], "Your Resume Analysis Results");
    }
}
