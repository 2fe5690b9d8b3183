//! # Relaycast Channels
//! Channel sender implementations behind one trait.
//!
//! Each sender wraps one external provider. Failures come back as
//! [`SendError`] values so the dispatch loop can record them per unit;
//! configuration problems are detected locally, before any network call.

use async_trait::async_trait;
use relaycast_core::types::{ChannelKind, SendError};

pub mod chat;
pub mod email;

pub use chat::ChatSender;
pub use email::EmailSender;

/// One delivery channel's send boundary.
///
/// The orchestrator guarantees at most one in-flight send per
/// (recipient, channel); implementations do not need provider-level
/// idempotency but must be safe to call again for the same recipient.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Which channel this sender serves.
    fn kind(&self) -> ChannelKind;

    /// Whether the sender has everything it needs to attempt delivery.
    fn is_configured(&self) -> bool;

    /// Attempt delivery of a rendered message to one destination address.
    /// `subject` only applies to channels that carry one (email).
    async fn send(
        &self,
        to: &str,
        body: &str,
        subject: Option<&str>,
    ) -> std::result::Result<(), SendError>;
}
