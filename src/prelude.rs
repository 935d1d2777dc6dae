//! Prelude module for the lineup builder library
//!
//! Re-exports the items a typical embedding needs with a single
//! `use lineup_builder::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lineup_builder::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let markets = load_markets(Path::new("markets.csv")).await?;
//!
//!     let api = Arc::new(LineupClient::new(&config.client_config())?);
//!     let coordinator = Coordinator::new(api, config.coordinator_config())?;
//!     let store = SqliteStore::open(&config.paths.database)?;
//!
//!     let outcome = run_build(&coordinator, &markets, store, &BuildOptions::default()).await?;
//!     println!("{}", outcome.summary);
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Configuration
pub use crate::config::AppConfig;

// Essential app components
pub use crate::app::{
    // Orchestration
    run_build,
    BuildOptions,
    BuildOutcome,
    BuildSummary,
    CheckpointRegistry,
    CheckpointRetention,
    ClientConfig,
    Coordinator,
    CoordinatorConfig,
    // Remote API
    LineupApi,
    LineupClient,
    // Market source
    load_markets,
    Market,
    MarketSetHash,
    ShutdownSignal,
    // Store
    SqliteStore,
    StationStore,
};

// Commonly used constants
pub use crate::constants::{DEFAULT_QUEUE_CAPACITY, ENV_SERVER_URL, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
