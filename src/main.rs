use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pado::commands;
use pado::config::Config;

#[derive(Parser)]
#[command(
    name = "pado",
    version,
    about = "Media trend detection engine with burst scoring and per-organization relevance projection",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables apply otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON Lines batch of mention records through one cycle
    Ingest {
        /// Batch file path
        input: PathBuf,

        /// Override the idempotency key (defaults to a content digest)
        #[arg(long)]
        run_id: Option<Uuid>,
    },

    /// Run the scheduled processing loop over the spool directory
    Run,

    /// List active trend events
    Trends {
        /// Only breaking trends
        #[arg(long)]
        breaking: bool,

        /// Only trending trends
        #[arg(long)]
        trending: bool,

        /// Filter by lifecycle stage
        #[arg(long)]
        stage: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Show (and lazily refresh) one organization's relevance scores
    Project {
        /// Organization id from the profiles file
        org_id: String,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Serve the read-only query API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    if let Err(reason) = pado::metrics::init_metrics() {
        tracing::warn!(%reason, "Metrics unavailable, continuing without them");
    }

    match cli.command {
        Commands::Ingest { input, run_id } => {
            commands::ingest::execute(&config, &input, run_id).await
        }
        Commands::Run => commands::run::execute(&config).await,
        Commands::Trends {
            breaking,
            trending,
            stage,
            limit,
            json,
        } => commands::trends::execute(&config, breaking, trending, stage, limit, json).await,
        Commands::Project { org_id, json } => {
            commands::project::execute(&config, &org_id, json).await
        }
        Commands::Serve => commands::serve::execute(&config).await,
    }
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
