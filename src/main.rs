//! # Pressline — Notification Scheduling & Delivery Engine
//!
//! Standalone runner: channels come from the config file, records live
//! in a local SQLite database, and an in-process timer loop fires due
//! deliveries.
//!
//! Usage:
//!   pressline                       # Run the delivery loop
//!   pressline --list                # Print stored notifications and exit
//!   pressline --interval 1 -v       # Tight loop with debug logging

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pressline_core::config::PresslineConfig;
use pressline_core::traits::SearchIndex;
use pressline_core::types::{NotificationKind, NotificationQuery};
use pressline_engine::{recover_jobs, spawn_delivery_loop, Dispatcher, JobPlanner, NotificationService, TickScheduler};
use pressline_notifiers::{
    EmailNotifier, HttpDocumentApi, NotifierRegistry, PushNotifier, SocialNotifier,
    SyndicationNotifier,
};
use pressline_security::CredentialCipher;
use pressline_store::{
    MemoryChannelStore, MemoryContentStore, RecordingAlerts, SqliteNotificationStore,
};

#[derive(Parser)]
#[command(
    name = "pressline",
    version,
    about = "📰 Pressline — notification scheduling & delivery engine"
)]
struct Cli {
    /// Config file (default: ~/.pressline/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path (default: ~/.pressline/pressline.db)
    #[arg(long)]
    db: Option<String>,

    /// Credential secret (recommended: set PRESSLINE_SECRET env var)
    #[arg(long, default_value = "")]
    secret: String,

    /// Delivery loop check interval in seconds
    #[arg(long, default_value = "5")]
    interval: u64,

    /// Print stored notifications and exit
    #[arg(long)]
    list: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "pressline=debug"
    } else {
        "pressline=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => PresslineConfig::load_from(std::path::Path::new(path))?,
        None => PresslineConfig::load()?,
    };

    let db_path = cli
        .db
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| PresslineConfig::home_dir().join("pressline.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteNotificationStore::open(&db_path)?);

    if cli.list {
        return list_records(store.as_ref()).await;
    }

    // Channels are config-defined in standalone mode.
    let channels = Arc::new(MemoryChannelStore::new());
    for entry in &config.channels {
        channels.put(entry.to_channel());
    }
    if config.channels.is_empty() {
        tracing::warn!("⚠️ No [[channel]] blocks in config; every create will fail validation");
    }

    // Standalone mode has no host CMS attached; only records without a
    // content binding can be delivered.
    let content = Arc::new(MemoryContentStore::new());

    let secret = std::env::var("PRESSLINE_SECRET").unwrap_or(cli.secret.clone());
    if secret.is_empty() {
        tracing::warn!("⚠️ Empty credential secret; encrypted channel settings will not decrypt");
    }
    let cipher = CredentialCipher::from_secret(&secret);

    let scheduler = Arc::new(TickScheduler::new());
    let alerts = Arc::new(RecordingAlerts::new());

    let mut registry = NotifierRegistry::new();
    registry.register(
        NotificationKind::Push,
        Arc::new(PushNotifier::new(config.backend.push.clone(), cipher.clone())),
    );
    registry.register(
        NotificationKind::Email,
        Arc::new(EmailNotifier::new(config.backend.email.clone(), cipher.clone())),
    );
    registry.register(
        NotificationKind::Social,
        Arc::new(SocialNotifier::new(config.backend.social.clone(), cipher.clone())),
    );
    match &config.backend.syndication.endpoint {
        Some(endpoint) => {
            let api = Arc::new(HttpDocumentApi::new(
                endpoint,
                config.backend.syndication.timeout_secs,
            ));
            registry.register(
                NotificationKind::Syndication,
                Arc::new(SyndicationNotifier::new(
                    config.backend.syndication.clone(),
                    cipher.clone(),
                    api,
                    store.clone(),
                    alerts,
                )),
            );
        }
        None => {
            tracing::info!("Syndication backend not configured (no endpoint), skipping");
        }
    }

    let service = Arc::new(NotificationService::new(
        &config,
        store.clone(),
        store.clone(),
        channels.clone(),
        content.clone(),
        scheduler.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        store.clone(),
        store.clone(),
        channels,
        content,
        scheduler.clone(),
        Arc::new(registry),
    ));

    // Restart recovery: rebuild the timer queue from Scheduled records.
    let planner = JobPlanner::new(config.scheduler.min_lead_secs);
    recover_jobs(store.as_ref(), scheduler.as_ref(), &planner).await?;

    tracing::info!("📰 Pressline started (db: {})", db_path.display());
    spawn_delivery_loop(scheduler, dispatcher, service, cli.interval).await;
    Ok(())
}

async fn list_records(index: &SqliteNotificationStore) -> Result<()> {
    let mut query = NotificationQuery {
        limit: 50,
        ..Default::default()
    };
    let mut shown = 0usize;
    loop {
        let page = index.query(&query).await?;
        if page.items.is_empty() {
            break;
        }
        let exhausted = page.items.len() < query.limit;
        for record in &page.items {
            println!(
                "{}  {:12}  {:10}  v{}  send_at={}  {}",
                record.id,
                record.kind.to_string(),
                format!("{:?}", record.send_status).to_lowercase(),
                record.version,
                record
                    .send_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into()),
                record.title,
            );
            shown += 1;
        }
        if exhausted {
            break;
        }
        query = query.next_page();
    }
    println!("{shown} notification(s)");
    Ok(())
}
