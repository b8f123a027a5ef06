use std::path::Path;

use clap::Parser;
use desklink_core::DeskLinkConfig;
use tracing_subscriber::{fmt, EnvFilter};

use desklink_console::run::Console;
use desklink_console::view::FileSink;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "desklink.toml")]
    config: String,

    /// Broker URL (overrides the config file)
    #[arg(short, long, env = "DESKLINK_BROKER")]
    broker: Option<String>,

    /// Name shown to clients in the consent prompt
    #[arg(short, long)]
    name: Option<String>,

    /// Directory the newest frame is written to
    #[arg(short, long)]
    frame_dir: Option<String>,
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
    let mut console_config = config.console.clone();
    if let Some(broker) = args.broker {
        console_config.broker_url = broker;
    }
    if let Some(name) = args.name {
        console_config.technician_name = name;
    }
    if let Some(dir) = args.frame_dir {
        console_config.frame_dir = dir;
    }

    let sink = FileSink::new(Path::new(&console_config.frame_dir))?;
    println!("Frames will be written to {}", sink.path().display());

    let mut console = Console::new(console_config, Box::new(sink))?;
    console.run().await
}
