//! Email sender — SMTP via async lettre.
//!
//! Credentials are process-level configuration. A missing host or login
//! produces a `not_configured` error without opening a connection.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, message::Mailbox,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use relaycast_core::config::EmailProviderConfig;
use relaycast_core::types::{ChannelKind, SendError};

use crate::ChannelSender;

const DEFAULT_SUBJECT: &str = "You have a new message";

/// Email channel sender.
pub struct EmailSender {
    config: EmailProviderConfig,
}

impl EmailSender {
    pub fn new(config: EmailProviderConfig) -> Self {
        Self { config }
    }

    fn build_message(
        &self,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<LettreMessage, SendError> {
        let from_name = self.config.from_name.as_deref().unwrap_or("Relaycast");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.from_email)
            .parse()
            .map_err(|e| SendError::rejected(format!("invalid from address: {e}")))?;

        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| SendError::rejected(format!("invalid to address: {e}")))?;

        LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| SendError::rejected(format!("build email: {e}")))
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_configured(&self) -> bool {
        self.config.enabled
            && !self.config.smtp_host.is_empty()
            && !self.config.from_email.is_empty()
            && !self.config.password.is_empty()
    }

    async fn send(
        &self,
        to: &str,
        body: &str,
        subject: Option<&str>,
    ) -> Result<(), SendError> {
        if !self.is_configured() {
            return Err(SendError::not_configured("email provider not configured"));
        }

        let subject = subject.unwrap_or(DEFAULT_SUBJECT);
        let email = self.build_message(to, subject, body)?;

        let creds = Credentials::new(
            self.config.from_email.clone(),
            self.config.password.clone(),
        );

        let mailer =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| SendError::transport(format!("SMTP relay: {e}")))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SendError::transport(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}
