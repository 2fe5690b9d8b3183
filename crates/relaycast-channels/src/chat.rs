//! Chat-messaging sender — Cloud API over HTTP.
//!
//! Wraps the provider's Graph-style messages endpoint. Requires an access
//! token and a sender (phone number) id provisioned for the tenant; without
//! both, every send fails locally with a `not_configured` error and no
//! network call is made.

use async_trait::async_trait;
use relaycast_core::config::ChatProviderConfig;
use relaycast_core::types::{ChannelKind, SendError};

use crate::ChannelSender;

/// Chat channel sender.
pub struct ChatSender {
    config: ChatProviderConfig,
    client: reqwest::Client,
}

impl ChatSender {
    pub fn new(config: ChatProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_url.trim_end_matches('/'),
            self.config.sender_id
        )
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<(), SendError> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": text
            }
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("Authorization", format!("Bearer {}", self.config.access_token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::transport(format!("chat API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SendError::rejected(format!("chat API error {status}: {error_text}")));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SendError::transport(format!("invalid chat API response: {e}")))?;

        let msg_id = result["messages"][0]["id"].as_str().unwrap_or("unknown");
        tracing::debug!("💬 Chat message sent: {} → {}", msg_id, to);
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for ChatSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    fn is_configured(&self) -> bool {
        self.config.enabled
            && !self.config.access_token.is_empty()
            && !self.config.sender_id.is_empty()
    }

    async fn send(
        &self,
        to: &str,
        body: &str,
        _subject: Option<&str>,
    ) -> Result<(), SendError> {
        if !self.is_configured() {
            return Err(SendError::not_configured(
                "chat channel not connected for this tenant",
            ));
        }
        self.send_text(to, body).await
    }
}
