use std::path::PathBuf;

use clap::{Parser, Subcommand};
use statsync::{
   Error, Result,
   cmd::{self, sync::SyncArgs},
   config::Config,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for statsync
#[derive(Parser)]
#[command(name = "statsync")]
#[command(about = "Sync per-player game stats into a relational store")]
#[command(version)]
struct Cli {
   #[arg(
      long,
      global = true,
      env = "STATSYNC_CONFIG",
      help = "Config file (default: ./statsync.toml)"
   )]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for statsync
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Sync every stats document into the store")]
   Sync {
      #[arg(long, help = "Compute changes without writing them")]
      dry_run: bool,

      #[arg(long, help = "JSON output")]
      json: bool,

      #[arg(short = 'w', long, help = "Players synced concurrently (overrides config)")]
      workers: Option<usize>,

      #[arg(long, help = "Hide the progress bar")]
      no_progress: bool,
   },

   #[command(about = "Create missing tables, columns and indexes")]
   Init,

   #[command(about = "Print the effective configuration as TOML")]
   Config,

   #[command(about = "Show row counts per table")]
   Status {
      #[arg(long, help = "JSON output")]
      json: bool,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_writer(std::io::stderr)
      .with_env_filter(
         EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .from_env_lossy(),
      )
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      if !matches!(err, Error::Reported { .. }) {
         eprintln!("{err}");
      }
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   let cfg = Config::load(cli.config.as_deref())?;

   match cli.command {
      Cmd::Sync { dry_run, json, workers, no_progress } => {
         cmd::sync::execute(cfg, SyncArgs { dry_run, json, workers, no_progress }).await
      },
      Cmd::Init => cmd::init::execute(cfg).await,
      Cmd::Config => cmd::config::execute(&cfg),
      Cmd::Status { json } => cmd::status::execute(cfg, json).await,
   }
}
