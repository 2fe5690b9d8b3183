//! Delivery ledger — SQLite schema and state-machine operations.

use relaycast_core::error::{RelaycastError, Result};
use relaycast_core::types::{
    ChannelKind, DeliveryStatus, RecipientSeed, RetryRequest, SendError, TenantCtx,
};
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Campaign record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Campaign {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Message template with `{placeholder}` tokens.
    pub template: String,
    pub email_subject: Option<String>,
    pub chat_enabled: bool,
    pub email_enabled: bool,
    /// Derived roll-up — written only by the aggregator.
    pub sent_count: u32,
    /// Derived roll-up — written only by the aggregator.
    pub failed_count: u32,
    pub created_at: String,
}

impl Campaign {
    pub fn channel_enabled(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Chat => self.chat_enabled,
            ChannelKind::Email => self.email_enabled,
        }
    }
}

/// Input for creating a campaign.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub chat_enabled: bool,
    #[serde(default)]
    pub email_enabled: bool,
}

/// One channel's delivery state on a recipient row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChannelState {
    pub status: DeliveryStatus,
    pub sent_at: Option<String>,
    pub error: Option<String>,
}

/// Recipient record — one per target person per campaign.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Recipient {
    pub id: String,
    pub campaign_id: String,
    pub source_ref: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub variables: HashMap<String, String>,
    pub link_token: Option<String>,
    /// Resolver output order — the deterministic pass order.
    pub position: i64,
    pub chat: ChannelState,
    pub email_state: ChannelState,
}

impl Recipient {
    pub fn channel(&self, channel: ChannelKind) -> &ChannelState {
        match channel {
            ChannelKind::Chat => &self.chat,
            ChannelKind::Email => &self.email_state,
        }
    }

    fn address(&self, channel: ChannelKind) -> Option<&str> {
        match channel {
            ChannelKind::Chat => self.phone.as_deref(),
            ChannelKind::Email => self.email.as_deref(),
        }
    }
}

/// One (recipient, channel) unit as fed to the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchUnit {
    pub recipient_id: String,
    pub channel: ChannelKind,
    pub address: String,
    pub name: String,
    pub variables: HashMap<String, String>,
    pub link_token: Option<String>,
}

/// Shared SELECT column list for recipient queries — single source of truth.
const RECIPIENT_SELECT: &str = "SELECT id,campaign_id,source_ref,name,phone,email,variables,link_token,position,chat_status,chat_sent_at,chat_error,email_status,email_sent_at,email_error FROM recipients";

/// Map a database row to a Recipient struct.
fn row_to_recipient(row: &rusqlite::Row) -> rusqlite::Result<Recipient> {
    let variables: String = row.get(6)?;
    let chat_status: String = row.get(9)?;
    let email_status: String = row.get(12)?;
    Ok(Recipient {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        source_ref: row.get(2)?,
        name: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        variables: serde_json::from_str(&variables).unwrap_or_default(),
        link_token: row.get(7)?,
        position: row.get(8)?,
        chat: ChannelState {
            status: DeliveryStatus::parse(&chat_status).unwrap_or(DeliveryStatus::NotApplicable),
            sent_at: row.get(10)?,
            error: row.get(11)?,
        },
        email_state: ChannelState {
            status: DeliveryStatus::parse(&email_status).unwrap_or(DeliveryStatus::NotApplicable),
            sent_at: row.get(13)?,
            error: row.get(14)?,
        },
    })
}

fn status_col(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Chat => "chat_status",
        ChannelKind::Email => "email_status",
    }
}

fn sent_at_col(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Chat => "chat_sent_at",
        ChannelKind::Email => "email_sent_at",
    }
}

fn error_col(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Chat => "chat_error",
        ChannelKind::Email => "email_error",
    }
}

/// The delivery ledger.
pub struct CampaignLedger {
    conn: Mutex<Connection>,
}

impl CampaignLedger {
    /// Open or create the ledger database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| RelaycastError::Ledger(format!("DB open error: {e}")))?;

        // WAL mode allows concurrent campaign workers against one file.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| RelaycastError::Ledger(format!("DB pragma error: {e}")))?;

        let ledger = Self { conn: Mutex::new(conn) };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// In-memory ledger for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RelaycastError::Ledger(format!("DB open error: {e}")))?;
        let ledger = Self { conn: Mutex::new(conn) };
        ledger.migrate()?;
        Ok(ledger)
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                template TEXT NOT NULL DEFAULT '',
                email_subject TEXT,
                chat_enabled INTEGER NOT NULL DEFAULT 0,
                email_enabled INTEGER NOT NULL DEFAULT 0,
                sent_count INTEGER NOT NULL DEFAULT 0,
                failed_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                source_ref TEXT,
                name TEXT NOT NULL DEFAULT '',
                phone TEXT,
                email TEXT,
                variables TEXT NOT NULL DEFAULT '{}',
                link_token TEXT,
                position INTEGER NOT NULL,
                chat_status TEXT NOT NULL DEFAULT 'not_applicable',
                chat_sent_at TEXT,
                chat_error TEXT,
                email_status TEXT NOT NULL DEFAULT 'not_applicable',
                email_sent_at TEXT,
                email_error TEXT,
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id)
            );

            CREATE INDEX IF NOT EXISTS idx_recipients_campaign
                ON recipients(campaign_id, position);
        ",
        )
        .map_err(|e| RelaycastError::Ledger(format!("Migration error: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RelaycastError::Ledger(format!("DB lock poisoned: {e}")))
    }

    // ── Campaigns ────────────────────────────────────

    /// Create a campaign owned by the given tenant.
    pub fn create_campaign(&self, tenant: &TenantCtx, new: &NewCampaign) -> Result<Campaign> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO campaigns (id, tenant_id, name, template, email_subject, chat_enabled, email_enabled, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)",
                params![
                    id,
                    tenant.tenant_id,
                    new.name,
                    new.template,
                    new.email_subject,
                    new.chat_enabled as i64,
                    new.email_enabled as i64,
                    now
                ],
            )
            .map_err(|e| RelaycastError::Ledger(format!("Insert campaign: {e}")))?;
        }
        tracing::info!("📋 Campaign created: '{}' ({})", new.name, id);
        self.get_campaign(tenant, &id)
    }

    /// Load a campaign, enforcing tenant ownership. The mandatory boundary
    /// check before any dispatch or retry pass touches data.
    pub fn get_campaign(&self, tenant: &TenantCtx, id: &str) -> Result<Campaign> {
        let campaign = self.get_campaign_any(id)?;
        if campaign.tenant_id != tenant.tenant_id {
            return Err(RelaycastError::Unauthorized(format!(
                "campaign {id} is not owned by tenant {}",
                tenant.tenant_id
            )));
        }
        Ok(campaign)
    }

    /// Load a campaign without the ownership check (aggregator internal).
    pub(crate) fn get_campaign_any(&self, id: &str) -> Result<Campaign> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id,tenant_id,name,template,email_subject,chat_enabled,email_enabled,sent_count,failed_count,created_at FROM campaigns WHERE id=?1",
            params![id],
            |row| {
                Ok(Campaign {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    name: row.get(2)?,
                    template: row.get(3)?,
                    email_subject: row.get(4)?,
                    chat_enabled: row.get::<_, i64>(5)? != 0,
                    email_enabled: row.get::<_, i64>(6)? != 0,
                    sent_count: row.get::<_, i64>(7)? as u32,
                    failed_count: row.get::<_, i64>(8)? as u32,
                    created_at: row.get(9)?,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                RelaycastError::NotFound(format!("campaign {id}"))
            }
            other => RelaycastError::Ledger(format!("Get campaign: {e}", e = other)),
        })
    }

    // ── Recipients ────────────────────────────────────

    /// Insert resolved recipients for a campaign.
    ///
    /// Initial per-channel status derivation: `not_applicable` when the
    /// address is absent or the channel is disabled for the campaign,
    /// `pending` otherwise.
    pub fn add_recipients(&self, campaign: &Campaign, seeds: &[RecipientSeed]) -> Result<usize> {
        let now_position: i64 = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT COALESCE(MAX(position), -1) FROM recipients WHERE campaign_id=?1",
                params![campaign.id],
                |row| row.get(0),
            )
            .map_err(|e| RelaycastError::Ledger(format!("Max position: {e}")))?
        };

        let conn = self.lock()?;
        for (i, seed) in seeds.iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            let chat_status = initial_status(campaign.chat_enabled, seed.phone.as_deref());
            let email_status = initial_status(campaign.email_enabled, seed.email.as_deref());
            let variables = serde_json::to_string(&seed.variables)
                .map_err(|e| RelaycastError::Ledger(format!("Serialize variables: {e}")))?;
            conn.execute(
                "INSERT INTO recipients (id, campaign_id, source_ref, name, phone, email, variables, link_token, position, chat_status, email_status)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    id,
                    campaign.id,
                    seed.source_ref,
                    seed.name,
                    seed.phone,
                    seed.email,
                    variables,
                    seed.link_token,
                    now_position + 1 + i as i64,
                    chat_status.as_str(),
                    email_status.as_str()
                ],
            )
            .map_err(|e| RelaycastError::Ledger(format!("Insert recipient: {e}")))?;
        }
        Ok(seeds.len())
    }

    /// All recipients of a campaign in deterministic (position) order.
    pub fn recipients_for(&self, campaign_id: &str) -> Result<Vec<Recipient>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{RECIPIENT_SELECT} WHERE campaign_id=?1 ORDER BY position"))
            .map_err(|e| RelaycastError::Ledger(format!("List recipients: {e}")))?;
        let rows = stmt
            .query_map(params![campaign_id], row_to_recipient)
            .map_err(|e| RelaycastError::Ledger(format!("List recipients: {e}")))?;
        Ok(rows
            .filter_map(|r| match r {
                Ok(recipient) => Some(recipient),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Skipping unreadable recipient row in campaign {}: {e}",
                        campaign_id
                    );
                    None
                }
            })
            .collect())
    }

    /// Load a single recipient.
    pub fn get_recipient(&self, id: &str) -> Result<Recipient> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{RECIPIENT_SELECT} WHERE id=?1"),
            params![id],
            row_to_recipient,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                RelaycastError::NotFound(format!("recipient {id}"))
            }
            other => RelaycastError::Ledger(format!("Get recipient: {other}")),
        })
    }

    // ── Unit selection ────────────────────────────────────

    /// Units in `pending` status, in pass order (position, chat before email).
    pub fn list_dispatchable(&self, campaign_id: &str) -> Result<Vec<DispatchUnit>> {
        self.units_with_status(campaign_id, DeliveryStatus::Pending, &RetryRequest::default())
    }

    /// Units in `failed` status for the requested channels — the exact
    /// input set for a retry pass, in the same deterministic order.
    pub fn list_failed(&self, campaign_id: &str, request: &RetryRequest) -> Result<Vec<DispatchUnit>> {
        self.units_with_status(campaign_id, DeliveryStatus::Failed, request)
    }

    fn units_with_status(
        &self,
        campaign_id: &str,
        status: DeliveryStatus,
        request: &RetryRequest,
    ) -> Result<Vec<DispatchUnit>> {
        let recipients = self.recipients_for(campaign_id)?;
        let mut units = Vec::new();
        for recipient in &recipients {
            for channel in [ChannelKind::Chat, ChannelKind::Email] {
                if !request.covers(channel) {
                    continue;
                }
                if recipient.channel(channel).status != status {
                    continue;
                }
                let Some(address) = recipient.address(channel) else {
                    continue;
                };
                units.push(DispatchUnit {
                    recipient_id: recipient.id.clone(),
                    channel,
                    address: address.to_string(),
                    name: recipient.name.clone(),
                    variables: recipient.variables.clone(),
                    link_token: recipient.link_token.clone(),
                });
            }
        }
        Ok(units)
    }

    // ── State transitions ────────────────────────────────────

    /// Flip a unit into `sending` and clear its error (optimistic clear).
    /// The single place a unit becomes active; called immediately before
    /// the send attempt so a crash leaves a visible `sending` row.
    pub fn mark_sending(&self, recipient_id: &str, channel: ChannelKind) -> Result<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                &format!(
                    "UPDATE recipients SET {status}='sending', {error}=NULL WHERE id=?1",
                    status = status_col(channel),
                    error = error_col(channel)
                ),
                params![recipient_id],
            )
            .map_err(|e| RelaycastError::Ledger(format!("Mark sending: {e}")))?;
        if updated == 0 {
            return Err(RelaycastError::NotFound(format!("recipient {recipient_id}")));
        }
        Ok(())
    }

    /// Record the outcome of a send attempt.
    pub fn mark_result(
        &self,
        recipient_id: &str,
        channel: ChannelKind,
        result: &std::result::Result<(), SendError>,
    ) -> Result<()> {
        let conn = self.lock()?;
        match result {
            Ok(()) => {
                let now = chrono::Utc::now().to_rfc3339();
                conn.execute(
                    &format!(
                        "UPDATE recipients SET {status}='sent', {sent_at}=?2, {error}=NULL WHERE id=?1",
                        status = status_col(channel),
                        sent_at = sent_at_col(channel),
                        error = error_col(channel)
                    ),
                    params![recipient_id, now],
                )
                .map_err(|e| RelaycastError::Ledger(format!("Mark sent: {e}")))?;
            }
            Err(send_err) => {
                conn.execute(
                    &format!(
                        "UPDATE recipients SET {status}='failed', {error}=?2 WHERE id=?1",
                        status = status_col(channel),
                        error = error_col(channel)
                    ),
                    params![recipient_id, send_err.to_column()],
                )
                .map_err(|e| RelaycastError::Ledger(format!("Mark failed: {e}")))?;
            }
        }
        Ok(())
    }

    /// Flip rows left in `sending` by an interrupted pass back to `failed`
    /// so they become retryable instead of silently lost.
    pub fn reconcile_stuck(&self, campaign_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let mut reconciled = 0;
        for channel in [ChannelKind::Chat, ChannelKind::Email] {
            reconciled += conn
                .execute(
                    &format!(
                        "UPDATE recipients SET {status}='failed', {error}=?2 WHERE campaign_id=?1 AND {status}='sending'",
                        status = status_col(channel),
                        error = error_col(channel)
                    ),
                    params![campaign_id, "transport: interrupted before completion"],
                )
                .map_err(|e| RelaycastError::Ledger(format!("Reconcile: {e}")))?;
        }
        if reconciled > 0 {
            tracing::warn!(
                "⚠️ Reconciled {} stuck 'sending' unit(s) for campaign {}",
                reconciled,
                campaign_id
            );
        }
        Ok(reconciled)
    }

    /// Write derived roll-up counters (aggregator internal).
    pub(crate) fn write_counters(&self, campaign_id: &str, sent: u32, failed: u32) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET sent_count=?2, failed_count=?3, updated_at=?4 WHERE id=?1",
            params![campaign_id, sent as i64, failed as i64, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| RelaycastError::Ledger(format!("Write counters: {e}")))?;
        Ok(())
    }
}

fn initial_status(channel_enabled: bool, address: Option<&str>) -> DeliveryStatus {
    match address {
        Some(addr) if channel_enabled && !addr.is_empty() => DeliveryStatus::Pending,
        _ => DeliveryStatus::NotApplicable,
    }
}
