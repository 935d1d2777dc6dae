//! Append-only journal of registry mutations
//!
//! One JSON object per line. Every append is flushed and `sync_data`'d before
//! returning, so a unit reported done survives a crash even if the next full
//! snapshot never happens. Snapshots truncate the journal.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{FailureRecord, UnitDone};
use crate::app::hash::MarketSetHash;
use crate::app::models::WriteCounts;
use crate::errors::{RegistryError, RegistryResult};

/// A single journaled mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalEntry {
    Done {
        market_set: MarketSetHash,
        done: UnitDone,
        #[serde(default)]
        rows: WriteCounts,
        at: DateTime<Utc>,
    },
    Failed {
        market_set: MarketSetHash,
        failure: FailureRecord,
    },
}

/// Handle on the journal file
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open (creating if needed) the journal for appending
    pub fn open(path: &Path) -> RegistryResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| io_error(path, source))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Read every entry of an existing journal
    ///
    /// A torn final line (crash during append) is skipped; a bad line anywhere
    /// else means the journal is corrupt.
    pub fn read_entries(path: &Path) -> RegistryResult<Vec<JournalEntry>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(path, source)),
        };

        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|source| io_error(path, source))?;

        let last = lines.len();
        let mut entries = Vec::with_capacity(last);
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(_) if index + 1 == last => {
                    warn!("Ignoring torn final line of {}", path.display());
                }
                Err(_) => {
                    return Err(RegistryError::CorruptJournal {
                        path: path.to_path_buf(),
                        line: index + 1,
                    })
                }
            }
        }
        Ok(entries)
    }

    /// Durably append one entry
    pub fn append(&mut self, entry: &JournalEntry) -> RegistryResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data())
            .map_err(|source| io_error(&self.path, source))
    }

    /// Drop all entries (after they were folded into a snapshot)
    pub fn truncate(&mut self) -> RegistryResult<()> {
        self.file
            .set_len(0)
            .and_then(|_| self.file.sync_data())
            .map_err(|source| io_error(&self.path, source))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.to_path_buf(),
        source,
    }
}
