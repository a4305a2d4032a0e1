mod api;
mod cli;
mod config;
mod db;
mod models;
mod providers;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::models::{LeagueCode, MergeStrategy};

#[derive(Parser)]
#[command(name = "statline")]
#[command(about = "Player box-score ingestion and rolling features for NBA, MLB and NHL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Backfill one league
    Ingest {
        #[arg(value_enum, ignore_case = true)]
        league: LeagueCode,
        /// NBA/MLB: 2024 2025, NHL: 20232024 20242025
        #[arg(long, num_args = 1..)]
        seasons: Vec<String>,
        #[arg(long, value_enum)]
        merge_strategy: Option<MergeStrategy>,
    },
    /// Backfill the two most recent seasons of every league
    IngestTwoYears {
        #[arg(long, value_enum)]
        merge_strategy: Option<MergeStrategy>,
    },
    /// Rolling points averages per player
    Features {
        #[arg(short, long, default_value = "10")]
        window: usize,
        #[arg(short, long, value_enum, ignore_case = true)]
        league: Option<LeagueCode>,
        /// Write the rows to a CSV file instead of printing them
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Row counts per league
    Status,
    /// Run the two-year backfill now, then once a day
    Schedule {
        /// Days to keep running after the first run (run_days + 1 runs in total)
        #[arg(long, default_value = "7")]
        run_days: u32,
    },
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;

    match cli.command {
        Commands::InitDb => {
            tracing::info!("Initializing database...");
            cli::init_db(&settings).await?;
        }
        Commands::Ingest { league, seasons, merge_strategy } => {
            if let Some(strategy) = merge_strategy {
                settings.merge_strategy = strategy;
            }
            tracing::info!("Ingesting {} ({:?})", league, settings.merge_strategy);
            cli::run_ingest(&settings, league, seasons).await?;
        }
        Commands::IngestTwoYears { merge_strategy } => {
            if let Some(strategy) = merge_strategy {
                settings.merge_strategy = strategy;
            }
            cli::ingest_two_years(&settings).await?;
        }
        Commands::Features { window, league, csv } => {
            cli::show_features(&settings, window, league, csv.as_deref()).await?;
        }
        Commands::Status => {
            cli::show_status(&settings).await?;
        }
        Commands::Schedule { run_days } => {
            cli::run_scheduler(&settings, run_days).await?;
        }
        Commands::Serve { port } => {
            tracing::info!("Starting StatLine API server on port {}", port);
            api::serve(&settings, port).await?;
        }
    }

    Ok(())
}
