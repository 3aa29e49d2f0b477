//! Atrium — personal dashboard gateway server.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use atrium_commands::CommandInterpreter;
use atrium_gateway::{GatewayConfig, GatewayManager, GatewayServer, WsTransport};
use atrium_skills::SkillDirectory;
use atrium_store::{MemoryStore, Store};

#[derive(Parser)]
#[command(name = "atrium", version, about = "Personal dashboard gateway server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the socket event server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8790)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve {
        host: "127.0.0.1".to_string(),
        port: 8790,
    }) {
        Commands::Serve { host, port } => serve(&host, port).await,
    }
}

async fn serve(host: &str, port: u16) -> anyhow::Result<()> {
    let config = GatewayConfig::from_env();
    if !config.is_configured() {
        tracing::warn!(
            "UPSTREAM_GATEWAY_URL / UPSTREAM_GATEWAY_TOKEN not set; \
             chat forwarding is disabled until they are"
        );
    }

    let store = Arc::new(MemoryStore::new());
    let skills = Arc::new(SkillDirectory::new());
    let interpreter = Arc::new(CommandInterpreter::new(
        store.clone() as Arc<dyn Store>,
        skills.clone(),
    ));
    let manager = GatewayManager::new(
        config.clone(),
        store as Arc<dyn Store>,
        interpreter,
        Arc::new(WsTransport::new()),
    );

    if config.is_configured() {
        manager.init().await?;
    }

    let server = GatewayServer::new(manager, skills);
    server.start(host, port).await?;
    Ok(())
}
