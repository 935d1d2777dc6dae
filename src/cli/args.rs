//! Command-line argument parsing for the lineup builder
//!
//! A single command: build (or resume building) the lineup database for the
//! markets listed in one file. Every flag that has a configuration file
//! counterpart overrides it.

use std::path::PathBuf;

use clap::{Args, Parser};
use tracing::warn;

use crate::app::{BuildOptions, CheckpointRetention};
use crate::config::AppConfig;
use crate::constants::workers;

/// Lineup builder - build a TV lineup and station database
#[derive(Parser, Debug, Clone)]
#[command(
    name = "lineup_builder",
    version,
    about = "Build a searchable TV lineup and station database from a remote lineup API",
    long_about = "Crawls the lineups serving each market in MARKETS_FILE, stores lineups, stations
and channel listings in SQLite, enhances stations with their full details, and indexes the
result. Interrupted runs resume from the checkpoint registry."
)]
pub struct Cli {
    /// Market list: one `COUNTRY,POSTAL_CODE` pair per line
    #[arg(value_name = "MARKETS_FILE")]
    pub markets_file: PathBuf,

    /// Remote lineup API base URL
    #[arg(long, env = "LINEUP_BUILDER_SERVER", value_name = "URL")]
    pub server: Option<String>,

    /// Ingestion producers (1-10)
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Enhancement producers (1-20)
    #[arg(long, value_name = "N")]
    pub enhance_workers: Option<usize>,

    /// SQLite database path
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Checkpoint registry path
    #[arg(long, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Ignore any existing checkpoint and replace stored lineup associations
    #[arg(short, long)]
    pub force: bool,

    /// Stop after ingestion; stations keep their base fields
    #[arg(long, conflicts_with = "enhance_only")]
    pub skip_enhancement: bool,

    /// Only enhance stations already in the database
    #[arg(long)]
    pub enhance_only: bool,

    /// What to do with the checkpoint after a fully successful run
    #[arg(long, value_enum, default_value_t = CheckpointRetention::Archive)]
    pub checkpoint_retention: CheckpointRetention,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Verbosity flags
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long)]
    pub very_verbose: bool,

    /// Quiet mode - errors only, no summary
    #[arg(short, long, conflicts_with_all = ["verbose", "very_verbose"])]
    pub quiet: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level from the verbosity flags, falling back to `configured`
    pub fn log_level(&self, configured: &str) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::TRACE
        } else if self.global.verbose {
            tracing::Level::DEBUG
        } else {
            configured.parse().unwrap_or(tracing::Level::INFO)
        }
    }

    /// Whether the interactive progress bar should be drawn
    pub fn show_progress(&self) -> bool {
        !self.no_progress && !self.global.quiet
    }

    /// Apply flag overrides onto the loaded configuration
    ///
    /// Worker counts outside their allowed range are clamped with a warning
    /// instead of rejected.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(server) = &self.server {
            config.client.server_url = server.clone();
        }
        if let Some(count) = self.workers {
            config.ingestion.workers = clamp_workers(
                "--workers",
                count,
                workers::MAX_INGEST_WORKERS,
            );
        }
        if let Some(count) = self.enhance_workers {
            config.enhancement.workers = clamp_workers(
                "--enhance-workers",
                count,
                workers::MAX_ENHANCE_WORKERS,
            );
        }
        if let Some(database) = &self.database {
            config.paths.database = database.clone();
        }
        if let Some(registry) = &self.registry {
            config.paths.registry = registry.clone();
        }
    }

    /// Build options for this invocation
    pub fn build_options(&self, config: &AppConfig) -> BuildOptions {
        BuildOptions {
            registry_path: config.paths.registry.clone(),
            force_refresh: self.force,
            skip_enhancement: self.skip_enhancement,
            enhance_only: self.enhance_only,
            retention: self.checkpoint_retention,
        }
    }
}

fn clamp_workers(flag: &str, requested: usize, max: usize) -> usize {
    let used = requested.clamp(1, max);
    if used != requested {
        warn!(
            "{} {} is outside 1-{}; using {}",
            flag, requested, max, used
        );
    }
    used
}
