use std::sync::Arc;

use clap::Parser;
use desklink_core::{DeskLinkConfig, MemoryStore, SessionStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use desklink_broker::{http, sweep};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "desklink.toml")]
    config: String,

    /// Override the listen port from the config file
    #[arg(short, long, env = "DESKLINK_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match DeskLinkConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    let mut broker_config = config.broker.clone();
    if let Some(port) = args.port {
        broker_config.port = port;
    }

    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());

    // Shutdown plumbing
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Spawn the stale-session sweeper
    let sweep_store = store.clone();
    let sweep_config = broker_config.clone();
    let sweep_shutdown = tx.subscribe();
    tokio::spawn(async move {
        sweep::run_sweep_loop(sweep_store, sweep_config, sweep_shutdown).await;
    });

    // Serve the relay API until shutdown
    http::start_http_server(store, broker_config, tx.subscribe()).await?;

    Ok(())
}
