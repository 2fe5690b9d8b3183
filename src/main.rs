//! # Relaycast — Campaign Dispatch & Retry Engine
//!
//! Paced multi-channel campaign sending with a persisted delivery ledger.
//!
//! Usage:
//!   relaycast                          # Start gateway (default port 3400)
//!   relaycast --port 8080              # Custom port
//!   relaycast --config ./custom.toml   # Custom config file

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use relaycast_channels::{ChatSender, EmailSender};
use relaycast_core::RelaycastConfig;
use relaycast_engine::{DispatchEngine, JitterPacer};
use relaycast_ledger::CampaignLedger;

#[derive(Parser)]
#[command(
    name = "relaycast",
    version,
    about = "📣 Relaycast — Campaign Dispatch & Retry Engine"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<String>,

    /// Gateway port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Ledger database path (overrides config)
    #[arg(long)]
    db_path: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "relaycast=debug,tower_http=debug"
    } else {
        "relaycast=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Load and validate config before anything touches the network
    let mut config = match &cli.config {
        Some(path) => RelaycastConfig::load_from(std::path::Path::new(&expand_path(path)))?,
        None => RelaycastConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(db_path) = &cli.db_path {
        config.ledger.db_path = db_path.clone();
    }
    config.validate()?;

    let db_path = expand_path(&config.ledger.db_path);
    let ledger = Arc::new(CampaignLedger::open(std::path::Path::new(&db_path))?);
    tracing::info!("💾 Delivery ledger: {}", db_path);

    let chat = ChatSender::new(config.chat.clone().unwrap_or_default());
    let email = EmailSender::new(config.email.clone().unwrap_or_default());
    if !config.chat.as_ref().is_some_and(|c| c.enabled) {
        tracing::warn!("⚠️ Chat channel not configured — chat units will fail as not_configured");
    }
    if !config.email.as_ref().is_some_and(|e| e.enabled) {
        tracing::warn!("⚠️ Email channel not configured — email units will fail as not_configured");
    }

    let engine = Arc::new(DispatchEngine::new(
        ledger,
        Arc::new(chat),
        Arc::new(email),
        Arc::new(JitterPacer::from_config(&config.pacing)),
        config.links.clone(),
        Duration::from_secs(config.pacing.send_timeout_secs),
    ));

    println!("📣 Relaycast v{}", env!("CARGO_PKG_VERSION"));
    println!("   🌐 Gateway:  http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   🗄️  Ledger:   {db_path}");
    println!(
        "   ⏳ Pacing:   {}–{}ms between sends",
        config.pacing.min_delay_ms, config.pacing.max_delay_ms
    );
    println!();

    // Stop in-flight passes at the next unit boundary on Ctrl-C, then exit
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⏹ Shutdown requested — finishing current unit");
            cancel.cancel();
        }
    });

    relaycast_gateway::start(&config.gateway, engine, None).await?;

    Ok(())
}
