//! CLI commands for the Agora hub
//!
//! - `run`: start the hub, replay the journal, serve until ctrl-c
//! - `doctor`: validate configuration and the data directory
//! - `types`: list the configured conversation types
//! - `replay`: print a conversation transcript from the journal

use agora_core::{Hub, HubConfig};
use agora_llm::{EnvSecretResolver, OpenRouterConfig, OpenRouterProvider};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Agora conversation hub CLI
#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(about = "Terminal multi-agent conversation hub")]
#[command(version)]
pub struct Cli {
    /// Root of persisted state (overrides config and XDG defaults)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the hub and serve until interrupted
    Run,
    /// Validate configuration and data directory health
    Doctor,
    /// List configured conversation types
    Types,
    /// Print a conversation transcript reconstructed from the journal
    Replay {
        /// Conversation id to print
        conversation_id: String,
    },
}

/// CLI error, mapped to an exit code by `main`
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration (exit 2)
    Config(String),
    /// Data directory problems (exit 3)
    DataDir(String),
    /// Anything else (exit 4)
    Internal(anyhow::Error),
}

impl From<agora_core::Error> for CliError {
    fn from(e: agora_core::Error) -> Self {
        match e {
            agora_core::Error::InvalidConfiguration(message) => Self::Config(message),
            agora_core::Error::Journal(agora_replay::Error::Io(io)) => {
                Self::DataDir(format!("data directory failure: {io}"))
            }
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

/// Run the selected subcommand
pub async fn run(args: Cli, config: HubConfig) -> Result<(), CliError> {
    match args.command.unwrap_or(Commands::Run) {
        Commands::Run => serve(config).await,
        Commands::Doctor => doctor(config).await,
        Commands::Types => types(config).await,
        Commands::Replay { conversation_id } => replay(config, &conversation_id).await,
    }
}

async fn open_hub(config: HubConfig) -> Result<Hub, CliError> {
    let hub = Hub::open(config).await?;
    hub.replay().await?;
    Ok(hub)
}

/// Wire providers the environment has credentials for.
fn register_providers(hub: &Hub) {
    let openrouter = OpenRouterConfig::default();
    if std::env::var_os(&openrouter.credential_ref).is_some() {
        let models = vec![openrouter.default_model.clone()];
        match OpenRouterProvider::new(openrouter, Arc::new(EnvSecretResolver)) {
            Ok(provider) => hub.register_provider("openrouter", Arc::new(provider), models),
            Err(e) => tracing::warn!("openrouter provider unavailable: {e}"),
        }
    }
}

async fn serve(config: HubConfig) -> Result<(), CliError> {
    let hub = open_hub(config).await?;
    register_providers(&hub);

    info!("hub is up; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CliError::Internal(e.into()))?;
    info!("shutting down");
    Ok(())
}

async fn doctor(config: HubConfig) -> Result<(), CliError> {
    let data_dir = config
        .data_dir
        .clone()
        .ok_or_else(|| CliError::Config("data_dir is not set".to_string()))?;

    let probe = data_dir.join(".doctor-probe");
    std::fs::write(&probe, b"ok")
        .and_then(|()| std::fs::remove_file(&probe))
        .map_err(|e| CliError::DataDir(format!("{} is not writable: {e}", data_dir.display())))?;

    let hub = open_hub(config).await?;
    let restored = hub.conversations().list().await.len();
    println!("data dir      {}", data_dir.display());
    println!("recording     {}", hub.recording());
    println!("conversations {restored}");
    println!("ok");
    Ok(())
}

async fn types(config: HubConfig) -> Result<(), CliError> {
    let hub = open_hub(config).await?;
    for type_config in hub.conversations().registry().enabled() {
        println!(
            "{:<13} {:>2}-{:<3} {} {}",
            type_config.kind,
            type_config.min_participants,
            type_config.max_participants,
            if type_config.requires_moderator {
                "moderated"
            } else {
                "open     "
            },
            type_config.description,
        );
    }
    Ok(())
}

async fn replay(config: HubConfig, conversation_id: &str) -> Result<(), CliError> {
    let hub = open_hub(config).await?;
    let conversation = hub.conversations().get(conversation_id).await?;

    println!(
        "{} [{}] {} ({} messages)",
        conversation.id,
        conversation.kind,
        conversation.subject,
        conversation.messages.len()
    );
    for message in &conversation.messages {
        println!(
            "{} {:<7} {:<12} {}",
            message.timestamp.format("%H:%M:%S"),
            message.author_kind,
            message.author_id,
            message.body
        );
    }
    Ok(())
}
