//! meshtask — compose, check, and dispatch mesh task batches over MQTT.

mod cmd;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meshtask_core::config::MeshtaskConfig;

#[derive(Parser)]
#[command(name = "meshtask", version, about = "Compose and dispatch mesh sensor task batches")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/meshtask/config.toml)
    #[arg(long, global = true, env = "MESHTASK_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to wait for replies, overriding mqtt.wait_secs
    #[arg(long, global = true)]
    wait: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Edit a new batch in $EDITOR, then dispatch it
    Create {
        /// Editor command, overriding editor.command and $EDITOR
        #[arg(long)]
        editor: Option<String>,
    },
    /// Remove scheduled tasks by name
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Validate a batch file and dispatch it
    Send { file: PathBuf },
    /// Validate a batch file without sending it
    Check { file: PathBuf },
    /// Print messages from a topic until interrupted
    Watch {
        /// Topic to follow (default: mqtt.topics.telemetry)
        #[arg(long)]
        topic: Option<String>,
    },
    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(MeshtaskConfig::file_path);
    let mut config = MeshtaskConfig::load_from(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if let Some(secs) = cli.wait {
        config.mqtt.wait_secs = Some(secs);
    }

    match cli.command {
        Command::Create { editor } => cmd::create::cmd_create(&config, editor.as_deref()).await,
        Command::Remove { names } => cmd::remove::cmd_remove(&config, &names).await,
        Command::Send { file } => cmd::send::cmd_send(&config, &file).await,
        Command::Check { file } => cmd::check::cmd_check(&config, &file),
        Command::Watch { topic } => cmd::watch::cmd_watch(&config, topic).await,
        Command::Config { action: None } => cmd::config::cmd_config_show(&config, &path),
        Command::Config { action: Some(ConfigAction::Init) } => cmd::config::cmd_config_init(&path),
    }
}
