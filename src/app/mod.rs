//! Core application logic for the lineup database builder
//!
//! Components, leaf first: the market source ([`markets`], [`hash`]), the
//! remote API client ([`client`]), the checkpoint registry ([`registry`]),
//! the persistent store and indexer ([`store`]), and the producer/consumer
//! machinery ([`queue`], [`worker`], [`coordinator`]).
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use lineup_builder::app::{
//!     load_markets, run_build, BuildOptions, ClientConfig, Coordinator, CoordinatorConfig,
//!     LineupClient, SqliteStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let markets = load_markets(Path::new("markets.csv")).await?;
//! let api = Arc::new(LineupClient::new(&ClientConfig::default())?);
//! let coordinator = Coordinator::new(api, CoordinatorConfig::default())?;
//! let store = SqliteStore::open(Path::new("lineups.db"))?;
//!
//! let outcome = run_build(&coordinator, &markets, store, &BuildOptions::default()).await?;
//! println!("{}", outcome.summary);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod hash;
pub mod markets;
pub mod models;
pub mod queue;
pub mod registry;
pub mod store;
pub mod worker;

// Re-export main public API
pub use client::{ClientConfig, LineupApi, LineupClient};
pub use coordinator::{
    run_build, BuildOptions, BuildOutcome, BuildSummary, Coordinator, CoordinatorConfig,
    listen_for_signals, LoggingObserver, PhaseRun, PhaseStats, ProgressObserver, ShutdownSignal,
};
pub use hash::MarketSetHash;
pub use markets::{load_markets, parse_markets};
pub use models::{
    BaseStation, Lineup, LineupMarket, Logo, Market, MarketBatch, StationDetail, StationLineup,
    StationListing, StationRef, WriteBatch, WriteCounts,
};
pub use queue::{batch_queue, WorkQueue};
pub use registry::{CheckpointRegistry, CheckpointRetention, RetentionOutcome, UnitKey};
pub use store::{SqliteStore, StationStore};
pub use worker::{RetryPolicy, WorkerConfig};
