use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tvdata_sync::{
    config::Config,
    database::Database,
    ingestor::SyncOrchestrator,
    models::SyncReport,
    repositories::{MemoryStore, ScheduleStore},
    sources::{HttpFetcher, TransferService},
};

#[derive(Parser)]
#[command(name = "tvdata-sync")]
#[command(version)]
#[command(about = "Keeps a local TV schedule database in sync with the listings mirrors")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Run `full` against an in-memory store with every channel selected
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh groups and channel lists
    Channels,
    /// Download changed program data for the selected channels
    Update {
        /// Days ahead of today to keep (overrides config file)
        #[arg(long, value_name = "N")]
        days: Option<u32>,
    },
    /// Channels followed by update
    Full,
    /// Print every known channel as JSON
    ListChannels,
    /// Include a channel in data updates
    Select { channel_id: String },
    /// Exclude a channel from data updates
    Deselect { channel_id: String },
}

fn orchestrator(store: Arc<dyn ScheduleStore>, config: &Config) -> Result<SyncOrchestrator> {
    let fetcher = Arc::new(HttpFetcher::new(&config.sync)?);
    let transfer = TransferService::new(fetcher, config.sync.worker_threads());
    Ok(SyncOrchestrator::new(store, transfer, config.sync.clone()))
}

/// Reports what a full sync of the whole catalog would download
async fn dry_run(config: &Config) -> Result<SyncReport> {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(store.clone(), config)?;

    let mut report = orchestrator.sync_channels().await?;
    for channel in store.list_channels().await? {
        store
            .set_channel_selected(&channel.external_channel_id, true)
            .await?;
    }
    report.merge(&orchestrator.sync_data().await?);
    info!("Dry run stored {} programs in memory", store.program_count()?);
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tvdata_sync={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting tvdata-sync v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Command::Update { days: Some(days) } = cli.command {
        config.sync.days_to_load = Some(days);
    }

    if cli.dry_run {
        if !matches!(cli.command, Command::Full) {
            anyhow::bail!("--dry-run only applies to the full command");
        }
        let report = dry_run(&config).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    let store: Arc<dyn ScheduleStore> = Arc::new(database);

    match cli.command {
        Command::ListChannels => {
            let channels = store.list_channels().await?;
            println!("{}", serde_json::to_string_pretty(&channels)?);
        }
        Command::Select { channel_id } => {
            let touched = store.set_channel_selected(&channel_id, true).await?;
            info!("Selected {} channel(s) with id {}", touched, channel_id);
        }
        Command::Deselect { channel_id } => {
            let touched = store.set_channel_selected(&channel_id, false).await?;
            info!("Deselected {} channel(s) with id {}", touched, channel_id);
        }
        Command::Channels | Command::Update { .. } | Command::Full => {
            let orchestrator = orchestrator(store, &config)?;

            let report = match cli.command {
                Command::Channels => orchestrator.sync_channels().await?,
                Command::Update { .. } => orchestrator.sync_data().await?,
                _ => orchestrator.full_sync().await?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
