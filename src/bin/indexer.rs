use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eth_transfer_indexer::backfill::BackfillCoordinator;
use eth_transfer_indexer::bus::LocalBus;
use eth_transfer_indexer::config::Config;
use eth_transfer_indexer::decimals::{CachedRpcDecimals, DecimalsResolver, FixedDecimals};
use eth_transfer_indexer::extractor::TransferExtractor;
use eth_transfer_indexer::http::{HttpState, create_http_router};
use eth_transfer_indexer::live::{HeadWatcher, LiveFeed};
use eth_transfer_indexer::persistence::PersistenceGateway;
use eth_transfer_indexer::repository::{CursorStore, DataType, Database, ProgressStore};
use eth_transfer_indexer::rpc::RpcClient;
use eth_transfer_indexer::subscriptions::{ConsumerSettings, spawn_subscriptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Extract native and token transfers from EVM blocks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the consumers, the HTTP triggers and, if enabled, the head watcher
    Run,
    /// Extract one block and print its transfers
    ExtractBlock {
        block: u64,
        #[arg(long, default_value = "false")]
        persist: bool,
    },
    /// Overwrite the live-feed cursor
    SetCursor { block: u64 },
    /// Remove a backfill progress record so a new job can start
    ClearProgress {
        #[arg(long = "type", default_value = "AssetTransfer")]
        data_type: DataType,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, db).await,
        Commands::ExtractBlock { block, persist } => {
            extract_block(config, db, block, persist).await
        }
        Commands::SetCursor { block } => {
            db.set_last_synced_block(block).await?;
            info!("Last synced block set to {}", block);
            Ok(())
        }
        Commands::ClearProgress { data_type } => {
            if db.clear_progress(data_type).await? {
                info!("Cleared {} progress", data_type);
            } else {
                info!("No {} progress recorded", data_type);
            }
            Ok(())
        }
    }
}

fn build_extractor(config: &Config, client: RpcClient) -> Arc<TransferExtractor> {
    let decimals: Arc<dyn DecimalsResolver> = if config.resolve_token_decimals {
        Arc::new(CachedRpcDecimals::new(Arc::new(client.clone()), config.token_decimals))
    } else {
        Arc::new(FixedDecimals(config.token_decimals))
    };
    Arc::new(TransferExtractor::new(Arc::new(client), decimals))
}

async fn run(config: Config, db: Database) -> Result<()> {
    info!("Starting asset transfer indexer");
    info!("RPC URLs: {} endpoint(s) configured", config.json_rpc_urls.len());

    let client = RpcClient::new(&config.json_rpc_urls)?;
    let extractor = build_extractor(&config, client.clone());
    let gateway = PersistenceGateway::new(Arc::new(db.clone()));
    let bus = Arc::new(LocalBus::new());

    let coordinator = Arc::new(BackfillCoordinator::new(
        extractor.clone(),
        gateway.clone(),
        Arc::new(db.clone()),
        bus.clone(),
        config.backfill_chunk_size,
    ));

    let mut tasks = JoinSet::new();
    spawn_subscriptions(
        &bus,
        &mut tasks,
        ConsumerSettings {
            ack_policy: config.ack_policy,
            redelivery_delay: config.redelivery_delay,
            consumers_per_subscription: config.consumers_per_subscription,
        },
        extractor.clone(),
        gateway,
        Arc::new(db.clone()),
        coordinator.clone(),
    )?;

    if config.live_feed_enabled {
        if db.get_last_synced_block().await?.is_none() {
            warn!("Live feed enabled without a cursor, seed it with `indexer set-cursor`");
        }
        let watcher = HeadWatcher::new(
            Arc::new(client),
            LiveFeed::new(Arc::new(db.clone()), bus.clone()),
            config.head_poll_interval,
        );
        tasks.spawn(async move { watcher.run().await });
        info!("Head watcher started");
    }

    let router = create_http_router(HttpState {
        extractor,
        coordinator,
    });
    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", config.http_port))?;
    info!("HTTP server listening on port {}", config.http_port);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await;

    tasks.shutdown().await;
    served.context("HTTP server error")
}

async fn extract_block(config: Config, db: Database, block: u64, persist: bool) -> Result<()> {
    let client = RpcClient::new(&config.json_rpc_urls)?;
    let extractor = build_extractor(&config, client);

    let transfers = extractor.extract_range(block, block).await?;
    println!("{}", serde_json::to_string_pretty(&transfers)?);

    if persist {
        let summary = PersistenceGateway::new(Arc::new(db))
            .persist_all(&transfers)
            .await?;
        info!(
            "Persisted block {}: {} inserted, {} duplicates",
            block, summary.inserted, summary.duplicates
        );
    }

    Ok(())
}
