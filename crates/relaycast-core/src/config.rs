//! Relaycast configuration system.
//!
//! Typed provider configs, validated at startup — provider credentials are
//! never passed into the core as opaque JSON blobs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelaycastError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelaycastConfig {
    #[serde(default)]
    pub chat: Option<ChatProviderConfig>,
    #[serde(default)]
    pub email: Option<EmailProviderConfig>,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl RelaycastConfig {
    /// Load config from the default path (~/.relaycast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelaycastError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RelaycastError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RelaycastError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Relaycast home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relaycast")
    }

    /// Validate cross-field constraints. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        self.pacing.validate()?;
        if let Some(chat) = &self.chat {
            chat.validate()?;
        }
        if let Some(email) = &self.email {
            email.validate()?;
        }
        Ok(())
    }
}

/// Chat-messaging provider (Cloud API style) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Provider Graph API base URL.
    #[serde(default = "default_chat_api_url")]
    pub api_url: String,
    /// Access token issued for the tenant's sender account.
    #[serde(default)]
    pub access_token: String,
    /// Provider-side id of the sending phone number.
    #[serde(default)]
    pub sender_id: String,
}

fn default_chat_api_url() -> String {
    "https://graph.facebook.com/v21.0".into()
}

impl Default for ChatProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_chat_api_url(),
            access_token: String::new(),
            sender_id: String::new(),
        }
    }
}

impl ChatProviderConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.api_url.is_empty() {
            return Err(RelaycastError::Config("chat.api_url must not be empty".into()));
        }
        Ok(())
    }
}

/// Email provider (SMTP) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailProviderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// From address, also the SMTP username.
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub password: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            from_email: String::new(),
            from_name: None,
            password: String::new(),
        }
    }
}

impl EmailProviderConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.smtp_port == 0 {
            return Err(RelaycastError::Config("email.smtp_port must not be 0".into()));
        }
        Ok(())
    }
}

/// Pacing configuration — jittered inter-send delay plus the per-send timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Lower bound of the randomized inter-send delay.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound of the randomized inter-send delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Hard timeout for a single channel send.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

fn default_min_delay_ms() -> u64 {
    3_000
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl PacingConfig {
    fn validate(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(RelaycastError::Config(format!(
                "pacing.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.send_timeout_secs == 0 {
            return Err(RelaycastError::Config("pacing.send_timeout_secs must not be 0".into()));
        }
        Ok(())
    }
}

/// Dynamic confirmation-link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Base URL; a recipient's secret token is appended as `/c/<token>`.
    #[serde(default = "default_link_base_url")]
    pub base_url: String,
    /// Substituted when a recipient has no secret token — never a broken link.
    #[serde(default = "default_link_fallback_url")]
    pub fallback_url: String,
}

fn default_link_base_url() -> String {
    "https://app.relaycast.io".into()
}
fn default_link_fallback_url() -> String {
    "https://app.relaycast.io/rsvp".into()
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            base_url: default_link_base_url(),
            fallback_url: default_link_fallback_url(),
        }
    }
}

/// Delivery ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub db_path: String,
}

fn default_ledger_path() -> String {
    "~/.relaycast/ledger.db".into()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { db_path: default_ledger_path() }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3400
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}
