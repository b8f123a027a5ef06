use clap::Parser;
use desklink_core::protocol::RegisterRequest;
use desklink_core::DeskLinkConfig;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use desklink_agent::capture::FrameSource;
use desklink_agent::input::InputBackend;
use desklink_agent::prompt::{AuthorizationPrompt, AutoApprove, StdinPrompt};
use desklink_agent::run::Agent;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "desklink.toml")]
    config: String,

    /// Broker URL (overrides the config file)
    #[arg(short, long, env = "DESKLINK_BROKER")]
    broker: Option<String>,

    /// Name shown to technicians in the session list
    #[arg(short, long)]
    name: Option<String>,

    /// Stable client identity; generated per run when omitted
    #[arg(long)]
    client_id: Option<String>,

    /// Approve every connection request without prompting (unattended
    /// machines)
    #[arg(long)]
    auto_approve: bool,
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
    let mut agent_config = config.agent.clone();
    if let Some(broker) = args.broker {
        agent_config.broker_url = broker;
    }
    if let Some(name) = args.name {
        agent_config.client_name = name;
    }

    let client_id = args.client_id.unwrap_or_else(|| {
        format!("client-{}", &Uuid::new_v4().simple().to_string()[..8])
    });

    let register = RegisterRequest {
        client_id,
        access_code: None,
        client_name: agent_config.client_name.clone(),
        os: std::env::consts::OS.to_string(),
    };

    let prompt: Box<dyn AuthorizationPrompt> = if args.auto_approve {
        Box::new(AutoApprove)
    } else {
        Box::new(StdinPrompt)
    };

    let mut agent = Agent::new(agent_config, register, frame_source()?, input_backend()?, prompt)?;
    agent.run().await
}

#[cfg(feature = "platform")]
fn frame_source() -> anyhow::Result<Box<dyn FrameSource>> {
    Ok(Box::new(desklink_agent::platform::ScreenSource::new()?))
}

#[cfg(not(feature = "platform"))]
fn frame_source() -> anyhow::Result<Box<dyn FrameSource>> {
    tracing::warn!("built without the platform feature, serving synthetic frames");
    Ok(Box::new(desklink_agent::capture::SyntheticSource::new(
        1024, 768,
    )))
}

#[cfg(feature = "platform")]
fn input_backend() -> anyhow::Result<Box<dyn InputBackend>> {
    Ok(Box::new(desklink_agent::platform::EnigoInput::new()?))
}

#[cfg(not(feature = "platform"))]
fn input_backend() -> anyhow::Result<Box<dyn InputBackend>> {
    Ok(Box::new(desklink_agent::input::NullInput::default()))
}
