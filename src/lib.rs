//! Lineup builder library
//!
//! Builds a searchable SQLite database of TV lineups, stations, and channel
//! listings from a remote lineup API. Market fetches run concurrently and are
//! funneled through a single store writer; a checkpoint registry makes
//! interrupted builds resumable.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
