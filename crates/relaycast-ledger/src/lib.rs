//! # Relaycast Ledger
//! The persisted delivery state machine.
//!
//! One row per recipient, with parallel per-channel status/timestamp/error
//! fields. The ledger is the single source of truth for dispatch and retry
//! decisions — the orchestrator never infers delivery state from anywhere
//! else.

pub mod aggregate;
pub mod db;

pub use aggregate::CampaignTotals;
pub use db::{Campaign, CampaignLedger, ChannelState, DispatchUnit, NewCampaign, Recipient};
