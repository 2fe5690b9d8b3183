//! Retry orchestrator — re-dispatch failed units only.
//!
//! A retry pass targets the ledger's `failed` set for the requested
//! channels, reconciles units stranded in `sending` by a crashed pass,
//! and reuses the same paced loop as the initial dispatch. Successful
//! units are never re-sent.

use relaycast_core::error::{RelaycastError, Result};
use relaycast_core::types::{RetryRequest, RetrySummary, TenantCtx};

use crate::dispatcher::DispatchEngine;

impl DispatchEngine {
    /// Retry every failed unit of a campaign for the channels the request
    /// covers. Runs single-flight per campaign, like `dispatch`.
    pub async fn retry(
        &self,
        tenant: &TenantCtx,
        campaign_id: &str,
        request: &RetryRequest,
    ) -> Result<RetrySummary> {
        if campaign_id.is_empty() {
            return Err(RelaycastError::InvalidRequest("empty campaign id".into()));
        }
        let campaign = self.ledger().get_campaign(tenant, campaign_id)?;

        let lock = self.campaign_lock(campaign_id);
        let _guard = lock.lock().await;

        // A crashed pass leaves units stuck in `sending`; fold them into
        // the failed set before selecting retry targets.
        self.ledger().reconcile_stuck(campaign_id)?;

        let units = self.ledger().list_failed(campaign_id, request)?;
        if units.is_empty() {
            tracing::info!("✅ Nothing to retry for campaign '{}'", campaign.name);
            return Ok(RetrySummary::default());
        }
        tracing::info!(
            "🔁 Retrying campaign '{}': {} failed unit(s)",
            campaign.name,
            units.len()
        );

        let (retried, succeeded, failed) = self.run_retry_units(&campaign, &units).await?;

        // Counters are recomputed even when every unit failed again.
        self.ledger().recompute(campaign_id)?;

        tracing::info!(
            "📊 Retry pass done for '{}': {} retried, {} sent, {} failed",
            campaign.name,
            retried,
            succeeded,
            failed
        );
        Ok(RetrySummary { retried, succeeded, failed })
    }
}
