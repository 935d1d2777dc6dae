//! Checkpoint registry
//!
//! Durable record of which units of work are complete, keyed by the identity
//! of the input market set. The registry is owned by the store writer and
//! mutated only after a successful store commit:
//!
//! 1. `mark_done` appends to the journal (durable before it returns)
//! 2. `snapshot` periodically folds everything into the JSON document
//!    (written to a temp file and atomically renamed) and truncates the journal
//! 3. `open` replays the journal over the last snapshot
//!
//! An interruption therefore loses at most the unit that was in flight.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::app::hash::MarketSetHash;
use crate::app::models::{Market, StationRef, WriteCounts};
use crate::constants::{files, registry};
use crate::errors::{RegistryError, RegistryResult};

pub mod journal;
pub mod types;

pub use journal::{Journal, JournalEntry};
pub use types::{
    Checkpoint, CheckpointStats, CheckpointStatus, FailureRecord, MarketStatus, Phase,
    RegistryDocument, StationStatus, UnitDone, UnitKey,
};

/// What to do with a fully successful checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointRetention {
    /// Move to a timestamped archive file
    #[default]
    Archive,
    /// Leave in the live registry; a re-run then does no work
    Keep,
    /// Delete
    Discard,
}

/// Result of applying a retention policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionOutcome {
    Archived(PathBuf),
    Kept,
    Discarded,
}

/// Registry bound to one market set
#[derive(Debug)]
pub struct CheckpointRegistry {
    path: PathBuf,
    market_set: MarketSetHash,
    checkpoint: Checkpoint,
    /// Checkpoints of every other market set in the document
    others: BTreeMap<MarketSetHash, Checkpoint>,
    journal: Journal,
    resumed: bool,
}

/// Borrowed form of [`RegistryDocument`] used for writing
#[derive(Serialize)]
struct DocumentView<'a> {
    version: u32,
    market_sets: BTreeMap<&'a MarketSetHash, &'a Checkpoint>,
}

impl CheckpointRegistry {
    /// Open the registry at `path` for `market_set`
    ///
    /// An existing checkpoint for the market set is resumed, unless
    /// `force_refresh` is set, in which case it is replaced by an empty one.
    /// The document is snapshotted before returning.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on a corrupt registry or journal
    pub fn open(
        path: &Path,
        market_set: MarketSetHash,
        market_count: usize,
        force_refresh: bool,
    ) -> RegistryResult<Self> {
        let journal_path = journal_path(path);
        let mut others = read_document(path, &journal_path)?.market_sets;
        let journal = Journal::open(&journal_path)?;

        let (checkpoint, resumed) = match others.remove(&market_set) {
            Some(checkpoint) if !force_refresh => {
                info!(
                    "Resuming checkpoint {} ({} markets done, {} stations done, {} failures)",
                    market_set.short(),
                    checkpoint.markets.len(),
                    checkpoint.stations.len(),
                    checkpoint.failures.len()
                );
                (checkpoint, true)
            }
            Some(_) => {
                info!("Force refresh: discarding checkpoint {}", market_set.short());
                (Checkpoint::new(market_count), false)
            }
            None => {
                info!("Starting new checkpoint {}", market_set.short());
                (Checkpoint::new(market_count), false)
            }
        };

        let mut registry = Self {
            path: path.to_path_buf(),
            market_set,
            checkpoint,
            others,
            journal,
            resumed,
        };
        registry.snapshot()?;
        Ok(registry)
    }

    /// Read the checkpoint for `market_set` without opening the registry
    pub fn load(path: &Path, market_set: &MarketSetHash) -> RegistryResult<Option<Checkpoint>> {
        let document = read_document(path, &journal_path(path))?;
        Ok(document.market_sets.get(market_set).cloned())
    }

    pub fn market_set(&self) -> MarketSetHash {
        self.market_set
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an existing checkpoint was resumed on open
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn is_done(&self, key: &UnitKey) -> bool {
        self.checkpoint.is_done(key)
    }

    /// Markets not yet done, in input order
    pub fn pending_markets(&self, markets: &[Market]) -> Vec<Market> {
        let checkpoint = &self.checkpoint;
        markets
            .iter()
            .filter(|m| !checkpoint.is_done(&UnitKey::Market(m.key())))
            .cloned()
            .collect()
    }

    /// Stations not yet enhanced or found missing
    pub fn pending_stations(&self, stations: Vec<StationRef>) -> Vec<StationRef> {
        let checkpoint = &self.checkpoint;
        stations
            .into_iter()
            .filter(|s| !checkpoint.is_done(&UnitKey::Station(s.station_id.clone())))
            .collect()
    }

    /// Record a committed unit
    ///
    /// Must only be called after the unit's rows are durably committed.
    pub fn mark_done(&mut self, done: UnitDone, rows: &WriteCounts) -> RegistryResult<()> {
        let at = Utc::now();
        self.journal.append(&JournalEntry::Done {
            market_set: self.market_set,
            done: done.clone(),
            rows: *rows,
            at,
        })?;
        self.checkpoint.apply_done(&done, rows, at);
        Ok(())
    }

    /// Record a permanently failed unit (retried on the next run)
    pub fn record_failure(&mut self, failure: FailureRecord) -> RegistryResult<()> {
        self.journal.append(&JournalEntry::Failed {
            market_set: self.market_set,
            failure: failure.clone(),
        })?;
        self.checkpoint.apply_failure(&failure);
        Ok(())
    }

    pub fn failure_count(&self) -> usize {
        self.checkpoint.failures.len()
    }

    /// Enter a pipeline phase and snapshot
    pub fn set_phase(&mut self, phase: Phase) -> RegistryResult<()> {
        self.checkpoint.phase = phase;
        self.checkpoint.last_updated = Utc::now();
        self.snapshot()
    }

    /// Mark the whole market set complete and snapshot
    pub fn mark_completed(&mut self) -> RegistryResult<()> {
        let now = Utc::now();
        self.checkpoint.status = CheckpointStatus::Completed;
        self.checkpoint.phase = Phase::Finished;
        self.checkpoint.completed_at = Some(now);
        self.checkpoint.last_updated = now;
        self.snapshot()
    }

    /// Atomically write the full document and truncate the journal
    pub fn snapshot(&mut self) -> RegistryResult<()> {
        let mut view = self.others_view();
        view.market_sets.insert(&self.market_set, &self.checkpoint);
        write_document_atomic(&self.path, &view)?;
        self.journal.truncate()?;
        debug!("Registry snapshot written to {}", self.path.display());
        Ok(())
    }

    /// Write the live document without this market set
    fn write_others(&mut self) -> RegistryResult<()> {
        write_document_atomic(&self.path, &self.others_view())?;
        self.journal.truncate()
    }

    fn others_view(&self) -> DocumentView<'_> {
        DocumentView {
            version: registry::VERSION,
            market_sets: self.others.iter().collect(),
        }
    }

    /// Move the checkpoint into `<stem>_<hash8>_<timestamp>.json`
    ///
    /// When this market set is the only one in the registry the registry file
    /// itself is renamed; otherwise the checkpoint is written to the archive
    /// file and removed from the live document.
    pub fn archive(mut self) -> RegistryResult<PathBuf> {
        let archive_path = self.archive_path();

        if self.others.is_empty() {
            self.snapshot()?;
            fs::rename(&self.path, &archive_path).map_err(|source| RegistryError::Io {
                path: self.path.clone(),
                source,
            })?;
            remove_if_exists(self.journal.path())?;
        } else {
            let archived = DocumentView {
                version: registry::VERSION,
                market_sets: BTreeMap::from([(&self.market_set, &self.checkpoint)]),
            };
            write_document_atomic(&archive_path, &archived)?;
            self.write_others()?;
        }

        info!("Checkpoint archived to {}", archive_path.display());
        Ok(archive_path)
    }

    /// Remove the checkpoint unless `keep` is set
    ///
    /// Returns whether the checkpoint was removed.
    pub fn discard(mut self, keep: bool) -> RegistryResult<bool> {
        if keep {
            self.snapshot()?;
            return Ok(false);
        }

        if self.others.is_empty() {
            remove_if_exists(&self.path)?;
            remove_if_exists(self.journal.path())?;
        } else {
            self.write_others()?;
        }

        info!("Checkpoint {} discarded", self.market_set.short());
        Ok(true)
    }

    /// Apply the retention policy to a completed checkpoint
    pub fn apply_retention(self, policy: CheckpointRetention) -> RegistryResult<RetentionOutcome> {
        match policy {
            CheckpointRetention::Archive => self.archive().map(RetentionOutcome::Archived),
            CheckpointRetention::Keep => {
                self.discard(true)?;
                Ok(RetentionOutcome::Kept)
            }
            CheckpointRetention::Discard => {
                self.discard(false)?;
                Ok(RetentionOutcome::Discarded)
            }
        }
    }

    fn archive_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("registry");
        let timestamp = Utc::now().format(files::ARCHIVE_TIMESTAMP_FORMAT);
        let name = format!("{}_{}_{}.json", stem, self.market_set.short(), timestamp);
        self.path.with_file_name(name)
    }
}

/// `<registry>.journal` next to the registry document
pub fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(files::JOURNAL_SUFFIX);
    PathBuf::from(name)
}

fn read_document(path: &Path, journal_path: &Path) -> RegistryResult<RegistryDocument> {
    let mut document = match fs::read(path) {
        Ok(bytes) => serde_json::from_slice::<RegistryDocument>(&bytes).map_err(|source| {
            RegistryError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryDocument::default(),
        Err(source) => {
            return Err(RegistryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if document.version != registry::VERSION {
        return Err(RegistryError::VersionMismatch {
            expected: registry::VERSION,
            found: document.version,
        });
    }

    let entries = Journal::read_entries(journal_path)?;
    if !entries.is_empty() {
        debug!("Replaying {} journal entries", entries.len());
    }
    for entry in entries {
        replay(&mut document, entry);
    }

    Ok(document)
}

fn replay(document: &mut RegistryDocument, entry: JournalEntry) {
    match entry {
        JournalEntry::Done {
            market_set,
            done,
            rows,
            at,
        } => match document.market_sets.get_mut(&market_set) {
            Some(checkpoint) => checkpoint.apply_done(&done, &rows, at),
            None => warn!("Journal entry for unknown market set {}", market_set.short()),
        },
        JournalEntry::Failed {
            market_set,
            failure,
        } => match document.market_sets.get_mut(&market_set) {
            Some(checkpoint) => checkpoint.apply_failure(&failure),
            None => warn!("Journal entry for unknown market set {}", market_set.short()),
        },
    }
}

fn write_document_atomic<T: Serialize>(path: &Path, document: &T) -> RegistryResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_error = |source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(&dir).map_err(io_error)?;
    serde_json::to_writer_pretty(&mut temp, document)?;
    temp.write_all(b"\n").map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| RegistryError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> RegistryResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use tempfile::TempDir;

    fn markets() -> Vec<Market> {
        vec![Market::new("USA", "90210"), Market::new("USA", "10001")]
    }

    fn market_done(key: &str) -> UnitDone {
        UnitDone::Market {
            key: key.to_string(),
            status: MarketStatus::Ingested,
        }
    }

    #[test]
    fn test_journal_survives_without_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let hash = MarketSetHash::from_markets(&markets());

        let mut registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        registry
            .mark_done(market_done("USA/90210"), &WriteCounts::default())
            .unwrap();
        // Simulated crash: dropped without snapshot
        drop(registry);

        let checkpoint = CheckpointRegistry::load(&path, &hash).unwrap().unwrap();
        assert!(checkpoint.is_done(&UnitKey::Market("USA/90210".into())));
        assert!(!checkpoint.is_done(&UnitKey::Market("USA/10001".into())));

        let registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        assert!(registry.resumed());
        assert_eq!(
            registry.pending_markets(&markets()),
            vec![Market::new("USA", "10001")]
        );
    }

    #[test]
    fn test_force_refresh_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let hash = MarketSetHash::from_markets(&markets());

        let mut registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        registry
            .mark_done(market_done("USA/90210"), &WriteCounts::default())
            .unwrap();
        registry.snapshot().unwrap();
        drop(registry);

        let registry = CheckpointRegistry::open(&path, hash, 2, true).unwrap();
        assert!(!registry.resumed());
        assert_eq!(registry.pending_markets(&markets()).len(), 2);
    }

    #[test]
    fn test_failures_recorded_and_cleared() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let hash = MarketSetHash::from_markets(&markets());

        let mut registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        registry
            .record_failure(FailureRecord::new(
                UnitKey::Market("USA/10001".into()),
                ErrorKind::Transient,
                3,
                "HTTP 503",
            ))
            .unwrap();
        assert_eq!(registry.failure_count(), 1);
        assert_eq!(registry.pending_markets(&markets()).len(), 2);

        registry
            .mark_done(market_done("USA/10001"), &WriteCounts::default())
            .unwrap();
        assert_eq!(registry.failure_count(), 0);
    }

    #[test]
    fn test_corrupt_document_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        fs::write(&path, "{ not json").unwrap();

        let hash = MarketSetHash::from_markets(&markets());
        let result = CheckpointRegistry::open(&path, hash, 2, false);
        assert!(matches!(result, Err(RegistryError::Corrupt { .. })));
    }

    #[test]
    fn test_archive_sole_market_set_renames_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let hash = MarketSetHash::from_markets(&markets());

        let mut registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        registry.mark_completed().unwrap();
        let archived = registry.archive().unwrap();

        assert!(!path.exists());
        assert!(!journal_path(&path).exists());
        let name = archived.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with(&format!("registry_{}_", hash.short())));
        assert!(name.ends_with(".json"));

        let archived_doc: RegistryDocument =
            serde_json::from_slice(&fs::read(&archived).unwrap()).unwrap();
        assert_eq!(
            archived_doc.market_sets[&hash].status,
            CheckpointStatus::Completed
        );
    }

    #[test]
    fn test_archive_with_other_market_sets_keeps_live_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let first = MarketSetHash::from_markets(&markets());
        let second = MarketSetHash::from_markets(&[Market::new("CAN", "M5V")]);

        drop(CheckpointRegistry::open(&path, second, 1, false).unwrap());
        let registry = CheckpointRegistry::open(&path, first, 2, false).unwrap();
        registry.archive().unwrap();

        assert!(path.exists());
        assert!(CheckpointRegistry::load(&path, &first).unwrap().is_none());
        assert!(CheckpointRegistry::load(&path, &second).unwrap().is_some());
    }

    #[test]
    fn test_discard_and_keep() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let hash = MarketSetHash::from_markets(&markets());

        let registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        assert!(!registry.discard(true).unwrap());
        assert!(CheckpointRegistry::load(&path, &hash).unwrap().is_some());

        let registry = CheckpointRegistry::open(&path, hash, 2, false).unwrap();
        assert!(registry.discard(false).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_journal_path() {
        assert_eq!(
            journal_path(Path::new("/tmp/registry.json")),
            PathBuf::from("/tmp/registry.json.journal")
        );
    }
}
