//! Campaign aggregator — derives roll-up counters from the terminal ledger.
//!
//! A recipient counts as sent when any channel reached `sent`, and as
//! failed only when every applicable channel is `failed`. Idempotent; runs
//! after every dispatch and retry pass.

use relaycast_core::error::Result;
use relaycast_core::types::{ChannelKind, DeliveryStatus};

use crate::db::{CampaignLedger, Recipient};

/// Derived campaign counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CampaignTotals {
    pub sent_count: u32,
    pub failed_count: u32,
}

fn classify(recipient: &Recipient) -> (bool, bool) {
    let mut any_sent = false;
    let mut any_applicable = false;
    let mut all_failed = true;
    for channel in [ChannelKind::Chat, ChannelKind::Email] {
        let status = recipient.channel(channel).status;
        if status == DeliveryStatus::NotApplicable {
            continue;
        }
        any_applicable = true;
        if status == DeliveryStatus::Sent {
            any_sent = true;
        }
        if status != DeliveryStatus::Failed {
            all_failed = false;
        }
    }
    (any_sent, any_applicable && all_failed && !any_sent)
}

impl CampaignLedger {
    /// Recompute `sent_count`/`failed_count` from the full ledger and write
    /// them back to the campaign record.
    pub fn recompute(&self, campaign_id: &str) -> Result<CampaignTotals> {
        // Existence check; counters are tenant-internal so no ownership
        // gate here — callers already passed the boundary check.
        self.get_campaign_any(campaign_id)?;

        let recipients = self.recipients_for(campaign_id)?;
        let mut sent_count = 0u32;
        let mut failed_count = 0u32;
        for recipient in &recipients {
            let (sent, failed) = classify(recipient);
            if sent {
                sent_count += 1;
            } else if failed {
                failed_count += 1;
            }
        }

        self.write_counters(campaign_id, sent_count, failed_count)?;
        tracing::debug!(
            "📊 Campaign {} roll-up: sent={} failed={}",
            campaign_id,
            sent_count,
            failed_count
        );
        Ok(CampaignTotals { sent_count, failed_count })
    }
}
