#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//! `observa` CLI - load statistics fixtures and run observation queries
//!
//! Usage:
//!   `observa init`
//!   `observa import ./fixture.json`
//!   `observa estimate ./query.json`
//!   `observa query ./query.json --format json`

mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use observa_core::ObservaConfig;

#[derive(Parser)]
#[command(name = "observa")]
#[command(
    author,
    version,
    about = "Observa CLI - faceted queries over statistical observations"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE", default_value = "observa.toml")]
    config: PathBuf,

    /// SQLite database path, overrides `storage.database_path`
    #[arg(short, long, global = true, env = "OBSERVA_DATABASE", value_name = "PATH")]
    database: Option<PathBuf>,
}

/// Output format of results.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Load a JSON fixture of subjects, locations and observations
    Import {
        /// Path to the fixture file
        fixture: PathBuf,
    },

    /// Estimate the size of a query and whether it would be cropped
    Estimate {
        /// Path to a JSON query context
        query: PathBuf,

        /// Output format (table, json)
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the matching plan of a query
    Plan {
        /// Path to a JSON query context
        query: PathBuf,

        /// Output format (table, json)
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Run a query and print the matched observations
    Query {
        /// Path to a JSON query context
        query: PathBuf,

        /// Output format (table, json)
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn init_logging(config: &ObservaConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "compact" {
        registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_interrupt(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling query");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ObservaConfig::load_from_path(&cli.config)?;
    if let Some(database) = &cli.database {
        config.storage.database_path = database.display().to_string();
    }
    config.validate()?;
    init_logging(&config);

    match cli.command {
        Commands::Init => {
            commands::init(&config)?;
            println!("Initialised database at {}", config.storage.database_path);
        }
        Commands::Import { fixture } => {
            let summary = commands::import(&config, &fixture).await?;
            println!(
                "Imported {} subjects, {} locations, {} observations ({} stored)",
                summary.subjects, summary.locations, summary.observations, summary.total_observations
            );
        }
        Commands::Estimate { query, format } => {
            let report = commands::estimate(&config, &query).await?;
            output::print_report(&report, format)?;
        }
        Commands::Plan { query, format } => {
            let plan = commands::plan(&config, &query).await?;
            output::print_plan(&plan, format)?;
        }
        Commands::Query { query, format } => {
            let cancel = CancellationToken::new();
            cancel_on_interrupt(&cancel);
            let outcome = commands::query(&config, &query, &cancel).await?;
            output::print_query(&outcome, format)?;
        }
    }

    Ok(())
}
