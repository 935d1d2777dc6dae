//! Registry document types

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::hash::MarketSetHash;
use crate::app::models::WriteCounts;
use crate::constants::registry;
use crate::errors::ErrorKind;

/// Identifies one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "unit", content = "key", rename_all = "snake_case")]
pub enum UnitKey {
    /// Market key (`USA/90210`)
    Market(String),
    /// Station id
    Station(String),
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Market(key) => write!(f, "market:{}", key),
            UnitKey::Station(id) => write!(f, "station:{}", id),
        }
    }
}

/// Terminal state of an ingested market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    /// Rows committed
    Ingested,
    /// Remote had no lineups for the market
    Empty,
}

/// Terminal state of an enhanced station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    Enhanced,
    /// No detail record (or no call sign to look one up)
    NotFound,
}

/// A unit that reached a terminal, non-failed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum UnitDone {
    Market { key: String, status: MarketStatus },
    Station { id: String, status: StationStatus },
}

impl UnitDone {
    pub fn key(&self) -> UnitKey {
        match self {
            UnitDone::Market { key, .. } => UnitKey::Market(key.clone()),
            UnitDone::Station { id, .. } => UnitKey::Station(id.clone()),
        }
    }
}

/// A unit that exhausted its retry budget or hit a fatal response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub unit: UnitKey,
    pub kind: ErrorKind,
    pub attempts: u32,
    pub message: String,
    pub failed_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(unit: UnitKey, kind: ErrorKind, attempts: u32, message: impl Into<String>) -> Self {
        Self {
            unit,
            kind,
            attempts,
            message: message.into(),
            failed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
}

/// Pipeline phase a checkpoint last entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ingestion,
    Enhancement,
    Indexing,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Ingestion => "ingestion",
            Phase::Enhancement => "enhancement",
            Phase::Indexing => "indexing",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Running totals recorded with a checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub markets_ingested: u64,
    pub markets_empty: u64,
    pub stations_enhanced: u64,
    pub stations_not_found: u64,
    pub rows: WriteCounts,
}

/// Progress of one market set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub market_count: usize,
    pub status: CheckpointStatus,
    pub phase: Phase,
    #[serde(default)]
    pub markets: BTreeMap<String, MarketStatus>,
    #[serde(default)]
    pub stations: BTreeMap<String, StationStatus>,
    /// Keyed by the unit key's display form
    #[serde(default)]
    pub failures: BTreeMap<String, FailureRecord>,
    #[serde(default)]
    pub stats: CheckpointStats,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(market_count: usize) -> Self {
        let now = Utc::now();
        Self {
            market_count,
            status: CheckpointStatus::InProgress,
            phase: Phase::Ingestion,
            markets: BTreeMap::new(),
            stations: BTreeMap::new(),
            failures: BTreeMap::new(),
            stats: CheckpointStats::default(),
            started_at: now,
            last_updated: now,
            completed_at: None,
        }
    }

    pub fn is_done(&self, key: &UnitKey) -> bool {
        match key {
            UnitKey::Market(key) => self.markets.contains_key(key),
            UnitKey::Station(id) => self.stations.contains_key(id),
        }
    }

    /// Record a terminal unit and clear any earlier failure for it
    pub fn apply_done(&mut self, done: &UnitDone, rows: &WriteCounts, at: DateTime<Utc>) {
        self.failures.remove(&done.key().to_string());

        match done {
            UnitDone::Market { key, status } => {
                if self.markets.insert(key.clone(), *status).is_none() {
                    match status {
                        MarketStatus::Ingested => self.stats.markets_ingested += 1,
                        MarketStatus::Empty => self.stats.markets_empty += 1,
                    }
                }
            }
            UnitDone::Station { id, status } => {
                if self.stations.insert(id.clone(), *status).is_none() {
                    match status {
                        StationStatus::Enhanced => self.stats.stations_enhanced += 1,
                        StationStatus::NotFound => self.stats.stations_not_found += 1,
                    }
                }
            }
        }

        self.stats.rows.merge(rows);
        self.last_updated = at;
    }

    pub fn apply_failure(&mut self, failure: &FailureRecord) {
        self.failures
            .insert(failure.unit.to_string(), failure.clone());
        self.last_updated = failure.failed_at;
    }

    pub fn market_failures(&self) -> usize {
        self.failures
            .values()
            .filter(|f| matches!(f.unit, UnitKey::Market(_)))
            .count()
    }

    pub fn station_failures(&self) -> usize {
        self.failures.len() - self.market_failures()
    }
}

/// The on-disk registry: one checkpoint per market set seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: u32,
    #[serde(default)]
    pub market_sets: BTreeMap<MarketSetHash, Checkpoint>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: registry::VERSION,
            market_sets: BTreeMap::new(),
        }
    }
}
