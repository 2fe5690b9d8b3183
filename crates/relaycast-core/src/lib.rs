//! # Relaycast Core
//! Shared error type, domain types, and typed configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::RelaycastConfig;
pub use error::{RelaycastError, Result};
pub use types::{
    ChannelKind, DeliveryStatus, DispatchSummary, RecipientSeed, RetryRequest, RetrySummary,
    SendError, SendErrorKind, TenantCtx,
};
