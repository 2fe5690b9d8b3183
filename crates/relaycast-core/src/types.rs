//! Shared domain types: channels, delivery states, send errors, summaries.

use serde::{Deserialize, Serialize};

/// Maximum length of an error detail stored in the ledger.
/// Provider responses can echo request payloads (including secrets), so the
/// detail is truncated before it ever reaches storage.
pub const MAX_ERROR_DETAIL: usize = 240;

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Email,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Chat => "chat",
            ChannelKind::Email => "email",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-(recipient, channel) delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// No address for this channel, or the channel is disabled for the campaign.
    NotApplicable,
    /// Eligible, not yet attempted.
    Pending,
    /// In flight right now.
    Sending,
    /// Delivered to the provider.
    Sent,
    /// Last attempt failed; candidate for retry.
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::NotApplicable => "not_applicable",
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_applicable" => Some(DeliveryStatus::NotApplicable),
            "pending" => Some(DeliveryStatus::Pending),
            "sending" => Some(DeliveryStatus::Sending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// Machine classification of a per-unit send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendErrorKind {
    /// Channel not configured/connected for this tenant — detected before
    /// any network call, will fail deterministically until config is fixed.
    NotConfigured,
    /// Provider accepted the request but rejected the message (non-2xx).
    Rejected,
    /// Network/transport failure reaching the provider.
    Transport,
    /// The bounded per-send timeout elapsed; treated like a provider error.
    Timeout,
}

impl SendErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendErrorKind::NotConfigured => "not_configured",
            SendErrorKind::Rejected => "rejected",
            SendErrorKind::Transport => "transport",
            SendErrorKind::Timeout => "timeout",
        }
    }
}

/// A per-unit delivery failure. This is a value recorded in the ledger,
/// never an error that propagates out of the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendError {
    pub kind: SendErrorKind,
    pub detail: String,
}

impl SendError {
    /// Build a send error with the detail truncated to [`MAX_ERROR_DETAIL`].
    pub fn new(kind: SendErrorKind, detail: impl Into<String>) -> Self {
        let mut detail: String = detail.into();
        if detail.chars().count() > MAX_ERROR_DETAIL {
            detail = detail.chars().take(MAX_ERROR_DETAIL).collect();
        }
        Self { kind, detail }
    }

    pub fn not_configured(detail: impl Into<String>) -> Self {
        Self::new(SendErrorKind::NotConfigured, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Rejected, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Transport, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(SendErrorKind::Timeout, detail)
    }

    /// Ledger column form: `kind: detail`.
    pub fn to_column(&self) -> String {
        format!("{}: {}", self.kind.as_str(), self.detail)
    }
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.detail)
    }
}

/// Explicit tenant context — passed into every core operation, never
/// inferred from ambient/global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantCtx {
    pub tenant_id: String,
}

impl TenantCtx {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self { tenant_id: tenant_id.into() }
    }
}

/// A resolved, dispatchable recipient — the Recipient Resolver's output and
/// the ledger's input. At least one address is guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSeed {
    /// Back-reference to the source entity (e.g. an invitee record).
    #[serde(default)]
    pub source_ref: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Per-recipient template variables.
    #[serde(default)]
    pub variables: std::collections::HashMap<String, String>,
    /// Per-recipient secret token for dynamic confirmation links.
    #[serde(default)]
    pub link_token: Option<String>,
}

/// Result of a dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Units attempted in this pass.
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Which channels a retry pass should cover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryRequest {
    #[serde(default = "default_true")]
    pub retry_chat: bool,
    #[serde(default = "default_true")]
    pub retry_email: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RetryRequest {
    fn default() -> Self {
        Self { retry_chat: true, retry_email: true }
    }
}

impl RetryRequest {
    pub fn covers(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Chat => self.retry_chat,
            ChannelKind::Email => self.retry_email,
        }
    }
}

/// Result of a retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    /// Units re-attempted in this pass.
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
}
