//! Phase and build statistics
//!
//! [`PhaseStats`] is filled by the store writer (unit outcomes and row
//! counts) and completed by the coordinator (timing, interruption).
//! [`BuildSummary`] aggregates both phases for the end-of-run report and is
//! stored as JSON in the `stats` metadata row.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::models::WriteCounts;
use crate::app::registry::Phase;

/// Outcome counts for one ingestion or enhancement phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: Phase,
    /// Units handed to producers
    pub pending: usize,
    /// Units already done according to the checkpoint
    pub skipped: usize,
    /// Units committed with rows
    pub done: usize,
    /// Units done without data (empty market, station not found)
    pub no_data: usize,
    pub failed: usize,
    pub rows: WriteCounts,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub interrupted: bool,
}

impl PhaseStats {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            pending: 0,
            skipped: 0,
            done: 0,
            no_data: 0,
            failed: 0,
            rows: WriteCounts::default(),
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }

    /// Units that reached the writer
    pub fn processed(&self) -> usize {
        self.done + self.no_data + self.failed
    }

    /// Pending units never processed (abandoned on shutdown)
    pub fn unprocessed(&self) -> usize {
        self.pending.saturating_sub(self.processed())
    }

    /// Processed units per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed() as f64 / secs
        } else {
            0.0
        }
    }
}

/// End-of-run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub market_set: String,
    pub ingestion: Option<PhaseStats>,
    pub enhancement: Option<PhaseStats>,
    pub indexed: bool,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub interrupted: bool,
    /// What happened to the checkpoint after a clean run
    pub retention: Option<String>,
}

impl BuildSummary {
    pub fn new(market_set: impl Into<String>) -> Self {
        Self {
            market_set: market_set.into(),
            ingestion: None,
            enhancement: None,
            indexed: false,
            elapsed: Duration::ZERO,
            interrupted: false,
            retention: None,
        }
    }

    pub fn markets_processed(&self) -> usize {
        self.ingestion.as_ref().map_or(0, |s| s.done)
    }

    pub fn markets_empty(&self) -> usize {
        self.ingestion.as_ref().map_or(0, |s| s.no_data)
    }

    pub fn markets_skipped(&self) -> usize {
        self.ingestion.as_ref().map_or(0, |s| s.skipped)
    }

    pub fn markets_failed(&self) -> usize {
        self.ingestion.as_ref().map_or(0, |s| s.failed)
    }

    pub fn stations_enhanced(&self) -> usize {
        self.enhancement.as_ref().map_or(0, |s| s.done)
    }

    pub fn stations_not_found(&self) -> usize {
        self.enhancement.as_ref().map_or(0, |s| s.no_data)
    }

    pub fn stations_skipped(&self) -> usize {
        self.enhancement.as_ref().map_or(0, |s| s.skipped)
    }

    pub fn stations_failed(&self) -> usize {
        self.enhancement.as_ref().map_or(0, |s| s.failed)
    }

    pub fn failures(&self) -> usize {
        self.markets_failed() + self.stations_failed()
    }

    /// Rows added across both phases
    pub fn rows(&self) -> WriteCounts {
        let mut rows = WriteCounts::default();
        for phase in [&self.ingestion, &self.enhancement].into_iter().flatten() {
            rows.merge(&phase.rows);
        }
        rows
    }
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows();
        writeln!(f, "Market set:          {}", self.market_set)?;
        writeln!(f, "Markets processed:   {}", self.markets_processed())?;
        writeln!(f, "Markets empty:       {}", self.markets_empty())?;
        writeln!(f, "Markets skipped:     {}", self.markets_skipped())?;
        writeln!(f, "Markets failed:      {}", self.markets_failed())?;
        writeln!(f, "Stations enhanced:   {}", self.stations_enhanced())?;
        writeln!(f, "Stations not found:  {}", self.stations_not_found())?;
        writeln!(f, "Stations skipped:    {}", self.stations_skipped())?;
        writeln!(f, "Stations failed:     {}", self.stations_failed())?;
        writeln!(
            f,
            "Rows added:          {} ({} lineups, {} stations, {} channel listings, {} lineup markets)",
            rows.total_rows(),
            rows.lineups,
            rows.stations,
            rows.relationships,
            rows.lineup_markets
        )?;
        write!(
            f,
            "Elapsed:             {:.1}s{}",
            self.elapsed.as_secs_f64(),
            if self.interrupted { " (interrupted)" } else { "" }
        )
    }
}
