use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "questhook")]
#[command(about = "Questhook - XP, streaks and quests for your coding sessions")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.questhook/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API that hook clients report to
    Serve {
        /// Override `server.port` from the config
        #[arg(long)]
        port: Option<u16>,
    },

    /// Recount a device's counters from its archived raw events
    Backfill {
        /// Device id to recount
        device: String,

        /// Show the changes without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Initialize a new ~/.questhook/config.toml configuration file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Serve { port }) => {
            cli::serve::serve_command(cli.config.as_deref(), port)?;
        }
        Some(Commands::Backfill { device, dry_run }) => {
            cli::backfill::backfill_command(cli.config.as_deref(), &device, dry_run)?;
        }
        Some(Commands::Init { force }) => {
            cli::init::init_command(cli.config, force)?;
        }
        None => {
            // Default: run the server
            cli::serve::serve_command(cli.config.as_deref(), None)?;
        }
    }

    Ok(())
}
