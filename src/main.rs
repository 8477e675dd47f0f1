//! Agora - Terminal multi-agent conversation hub
//!
//! CLI entry point. Loads the layered configuration, resolves the
//! per-user data directory and runs the requested subcommand.
//!
//! Exit codes: 0 success, 2 configuration error, 3 data directory
//! inaccessible, 4 fatal internal error.

#![forbid(unsafe_code)]

mod cli;

use agora_core::HubConfig;
use clap::Parser;
use config::{Config, Environment, File};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_CONFIG: u8 = 2;
const EXIT_DATA_DIR: u8 = 3;
const EXIT_INTERNAL: u8 = 4;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agora=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Resolve the data directory: flag, then config, then the platform
/// data dir (`XDG_DATA_HOME` on Linux) under `agora/`.
fn resolve_data_dir(flag: Option<PathBuf>, config: &HubConfig) -> Option<PathBuf> {
    flag.or_else(|| config.data_dir.clone()).or_else(|| {
        std::env::var_os("XDG_DATA_HOME")
            .map(|base| PathBuf::from(base).join("agora"))
            .or_else(|| dirs::data_dir().map(|base| base.join("agora")))
    })
}

fn load_config(path: Option<&PathBuf>) -> Result<HubConfig, config::ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path.clone()));
    } else {
        builder = builder.add_source(File::with_name("agora").required(false));
    }
    builder
        .add_source(Environment::with_prefix("AGORA").separator("__"))
        .build()?
        .try_deserialize()
}

fn main() -> ExitCode {
    init_tracing();
    let args = cli::Cli::parse();

    let mut hub_config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let Some(data_dir) = resolve_data_dir(args.data_dir.clone(), &hub_config) else {
        error!("no data directory could be resolved; pass --data-dir");
        return ExitCode::from(EXIT_DATA_DIR);
    };
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!("data directory {} is inaccessible: {e}", data_dir.display());
        return ExitCode::from(EXIT_DATA_DIR);
    }
    hub_config.data_dir = Some(data_dir);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };

    match runtime.block_on(cli::run(args, hub_config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(cli::CliError::Config(message)) => {
            error!("{message}");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(cli::CliError::DataDir(message)) => {
            error!("{message}");
            ExitCode::from(EXIT_DATA_DIR)
        }
        Err(cli::CliError::Internal(e)) => {
            error!("{e:#}");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}
