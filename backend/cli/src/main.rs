mod api;
mod serve;
mod sessions_cmd;
mod stats_cmd;
mod terminal_output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use voicetally_config::{
    default_config_path, load_and_prepare, log_config_warnings, redacted_config, validate,
};
use voicetally_core::{SessionStore, StatKind};
use voicetally_store::SqliteStore;

use terminal_output::{note_error, note_success, note_warn};

#[derive(Parser)]
#[command(name = "voicetally")]
#[command(about = "Discord voice channel time tracker")]
#[command(version)]
struct Cli {
    /// Config file (default: $VOICETALLY_CONFIG or ~/.voicetally/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and start tracking voice time
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep all data in memory instead of the database file
        #[arg(long)]
        in_memory: bool,
    },
    /// Print a ranking of recorded voice time
    Stats {
        #[arg(short, long)]
        guild: String,
        /// channel or user
        #[arg(short, long)]
        kind: StatKind,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List sessions that are currently open
    Sessions {
        #[arg(short, long)]
        guild: Option<String>,
    },
    /// Load and validate the configuration, then print it with secrets masked
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);

    if let Commands::CheckConfig = cli.command {
        return check_config(&config_path).await;
    }

    let mut config = load_and_prepare(&config_path).await?;

    voicetally_logging::init_logger(
        &config.logging.level,
        config.logging.dir.as_deref().map(Path::new),
        config.logging.json,
    )?;
    log_config_warnings(&config);

    match cli.command {
        Commands::Serve { port, in_memory } => {
            if let Some(port) = port {
                config.http.port = port;
            }
            serve::run_server(config, in_memory).await?;
        }
        Commands::Stats { guild, kind, limit } => {
            let store = open_store(&config.storage.db_path)?;
            let limit = limit.unwrap_or(config.reports.limit);
            let result = stats_cmd::run(Arc::clone(&store), &guild, kind, limit).await;
            store.close().await?;
            result?;
        }
        Commands::Sessions { guild } => {
            let store = open_store(&config.storage.db_path)?;
            let result = sessions_cmd::run(Arc::clone(&store), guild.as_deref()).await;
            store.close().await?;
            result?;
        }
        Commands::CheckConfig => {}
    }

    Ok(())
}

fn open_store(db_path: &str) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Failed to open database: {db_path}"))?;
    Ok(Arc::new(store))
}

async fn check_config(path: &Path) -> Result<()> {
    println!("Config file: {}", path.display());
    let config = match load_and_prepare(path).await {
        Ok(config) => config,
        Err(e) => {
            note_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    };

    for warning in validate(&config).warnings {
        note_warn(&format!("{}: {}", warning.path, warning.message));
    }
    println!("{}", serde_json::to_string_pretty(&redacted_config(&config))?);
    note_success("Configuration is valid");
    Ok(())
}
