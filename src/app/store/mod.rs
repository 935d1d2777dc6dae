//! Persistent store
//!
//! [`StationStore`] is the write seam used by the store writer; [`SqliteStore`]
//! implements it over a single SQLite connection. Each `apply_*` call is one
//! transaction that has committed by the time it returns, which is what lets
//! the writer mark the unit done in the registry right afterwards.
//!
//! Upserts are insert-or-ignore followed by an update, so repeated writes of
//! the same records add no rows. Base station fields are only refreshed while a
//! station is still `base`; an enhanced station is never downgraded.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::models::{MarketBatch, StationDetail, StationRef, WriteCounts};
use crate::app::registry::FailureRecord;
use crate::errors::{StoreError, StoreResult};

pub mod schema;

/// Writes and reads needed by the pipeline
///
/// Implementations are owned by exactly one writer thread.
pub trait StationStore: Send + 'static {
    /// Apply every record of one market in dependency order, in one transaction
    fn apply_market_batch(&mut self, batch: &MarketBatch) -> StoreResult<WriteCounts>;

    /// Upgrade one station to enhanced, in one transaction
    fn apply_station_detail(&mut self, detail: &StationDetail) -> StoreResult<WriteCounts>;

    /// Stations still tagged `base`
    fn base_stations(&self) -> StoreResult<Vec<StationRef>>;

    /// Append a permanently failed unit to the processing log
    fn record_failure(&mut self, process_type: &str, failure: &FailureRecord) -> StoreResult<()>;

    fn set_metadata(&mut self, key: &str, value: &str) -> StoreResult<()>;

    /// Drop and recreate query indexes and the full-text table
    fn rebuild_indexes(&mut self) -> StoreResult<()>;
}

/// Row counts of the relational tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub markets: u64,
    pub lineups: u64,
    pub stations: u64,
    pub station_lineups: u64,
    pub lineup_markets: u64,
}

/// A station row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStation {
    pub station_id: String,
    pub call_sign: Option<String>,
    pub name: Option<String>,
    pub station_type: Option<String>,
    pub bcast_langs: Option<String>,
    pub logo_uri: Option<String>,
    pub source: String,
}

/// SQLite-backed store
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its schema
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|_| StoreError::InvalidPath {
                path: path.to_path_buf(),
            })?;
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened {} (journal_mode={})", path.display(), mode);
        Self::configure(conn)
    }

    /// In-memory database, mainly for tests
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(30))?;
        schema::create_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn table_counts(&self) -> StoreResult<TableCounts> {
        let count = |table: &str| -> StoreResult<u64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(TableCounts {
            markets: count("markets")?,
            lineups: count("lineups")?,
            stations: count("stations")?,
            station_lineups: count("station_lineups")?,
            lineup_markets: count("lineup_markets")?,
        })
    }

    pub fn station(&self, station_id: &str) -> StoreResult<Option<StoredStation>> {
        let station = self
            .conn
            .query_row(
                r#"
                SELECT station_id, call_sign, name, type, bcast_langs, logo_uri, source
                FROM stations WHERE station_id = ?1
                "#,
                params![station_id],
                |row| {
                    Ok(StoredStation {
                        station_id: row.get(0)?,
                        call_sign: row.get(1)?,
                        name: row.get(2)?,
                        station_type: row.get(3)?,
                        bcast_langs: row.get(4)?,
                        logo_uri: row.get(5)?,
                        source: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(station)
    }

    pub fn metadata(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Number of processing log rows for a process type
    pub fn failure_log_count(&self, process_type: &str) -> StoreResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processing_log WHERE process_type = ?1",
            params![process_type],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Lineup ids associated with a market
    pub fn market_lineups(&self, country: &str, postal_code: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT lineup_id FROM lineup_markets WHERE country = ?1 AND postal_code = ?2 ORDER BY lineup_id",
        )?;
        let rows = stmt.query_map(params![country, postal_code], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

impl StationStore for SqliteStore {
    fn apply_market_batch(&mut self, batch: &MarketBatch) -> StoreResult<WriteCounts> {
        let tx = self.conn.transaction()?;
        let counts = write_market_batch(&tx, batch)?;
        tx.commit()?;
        Ok(counts)
    }

    fn apply_station_detail(&mut self, detail: &StationDetail) -> StoreResult<WriteCounts> {
        let bcast_langs = serde_json::to_string(&detail.bcast_langs).map_err(|source| {
            StoreError::Encode {
                column: "bcast_langs",
                source,
            }
        })?;

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            r#"
            UPDATE stations SET
                call_sign = COALESCE(?2, call_sign),
                name = COALESCE(?3, name),
                type = COALESCE(?4, type),
                bcast_langs = ?5,
                logo_uri = COALESCE(?6, logo_uri),
                logo_width = COALESCE(?7, logo_width),
                logo_height = COALESCE(?8, logo_height),
                logo_category = COALESCE(?9, logo_category),
                logo_primary = COALESCE(?10, logo_primary),
                source = 'enhanced',
                updated_at = CURRENT_TIMESTAMP
            WHERE station_id = ?1
            "#,
            params![
                detail.station_id,
                detail.call_sign,
                detail.name,
                detail.station_type,
                bcast_langs,
                detail.logo.uri,
                detail.logo.width,
                detail.logo.height,
                detail.logo.category,
                detail.logo.primary,
            ],
        )?;
        tx.commit()?;

        Ok(WriteCounts {
            enhanced: updated as u64,
            ..Default::default()
        })
    }

    fn base_stations(&self) -> StoreResult<Vec<StationRef>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT station_id, call_sign FROM stations WHERE source = 'base' ORDER BY station_id",
        )?;
        let rows = stmt.query_map([], |row| Ok(StationRef::new(row.get::<_, String>(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn record_failure(&mut self, process_type: &str, failure: &FailureRecord) -> StoreResult<()> {
        let message = format!(
            "{} after {} attempt(s): {}",
            failure.kind, failure.attempts, failure.message
        );
        self.conn.execute(
            r#"
            INSERT INTO processing_log (process_type, target_id, status, message)
            VALUES (?1, ?2, 'failed', ?3)
            "#,
            params![process_type, failure.unit.to_string(), message],
        )?;
        Ok(())
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO metadata (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn rebuild_indexes(&mut self) -> StoreResult<()> {
        schema::rebuild_indexes(&mut self.conn)
    }
}

// Dependency order: market, lineups, lineup_markets, stations, station_lineups.
fn write_market_batch(conn: &Connection, batch: &MarketBatch) -> StoreResult<WriteCounts> {
    let mut counts = WriteCounts::default();
    let market = &batch.market;

    counts.markets += conn.execute(
        "INSERT OR IGNORE INTO markets (country, postal_code) VALUES (?1, ?2)",
        params![market.country, market.postal_code],
    )? as u64;

    if batch.replace_existing {
        let removed = conn.execute(
            "DELETE FROM lineup_markets WHERE country = ?1 AND postal_code = ?2",
            params![market.country, market.postal_code],
        )?;
        debug!("{}: cleared {} lineup associations", market, removed);
    }

    {
        let mut insert = conn.prepare_cached(
            r#"
            INSERT OR IGNORE INTO lineups (lineup_id, name, location, type, device, mso_id, mso_name)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;
        let mut update = conn.prepare_cached(
            r#"
            UPDATE lineups SET name = ?2, location = ?3, type = ?4, device = ?5,
                mso_id = ?6, mso_name = ?7, updated_at = CURRENT_TIMESTAMP
            WHERE lineup_id = ?1
            "#,
        )?;
        for lineup in &batch.lineups {
            let values: &[&dyn ToSql] = &[
                &lineup.lineup_id,
                &lineup.name,
                &lineup.location,
                &lineup.lineup_type,
                &lineup.device,
                &lineup.mso_id,
                &lineup.mso_name,
            ];
            if insert.execute(values)? > 0 {
                counts.lineups += 1;
            } else {
                update.execute(values)?;
            }
        }
    }

    {
        let mut insert = conn.prepare_cached(
            "INSERT OR IGNORE INTO lineup_markets (lineup_id, country, postal_code) VALUES (?1, ?2, ?3)",
        )?;
        for lm in &batch.lineup_markets {
            counts.lineup_markets +=
                insert.execute(params![lm.lineup_id, lm.country, lm.postal_code])? as u64;
        }
    }

    {
        let mut insert = conn.prepare_cached(
            r#"
            INSERT OR IGNORE INTO stations
                (station_id, call_sign, logo_uri, logo_width, logo_height, logo_category, logo_primary, source)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'base')
            "#,
        )?;
        let mut update = conn.prepare_cached(
            r#"
            UPDATE stations SET call_sign = ?2, logo_uri = ?3, logo_width = ?4, logo_height = ?5,
                logo_category = ?6, logo_primary = ?7, updated_at = CURRENT_TIMESTAMP
            WHERE station_id = ?1 AND source = 'base'
            "#,
        )?;
        for station in &batch.stations {
            let values: &[&dyn ToSql] = &[
                &station.station_id,
                &station.call_sign,
                &station.logo.uri,
                &station.logo.width,
                &station.logo.height,
                &station.logo.category,
                &station.logo.primary,
            ];
            if insert.execute(values)? > 0 {
                counts.stations += 1;
            } else {
                update.execute(values)?;
            }
        }
    }

    {
        let mut insert = conn.prepare_cached(
            r#"
            INSERT OR IGNORE INTO station_lineups
                (station_id, lineup_id, channel_number, affiliate_id, affiliate_call_sign,
                 signal_type, video_type, tru_resolution)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        let mut update = conn.prepare_cached(
            r#"
            UPDATE station_lineups SET channel_number = ?3, affiliate_id = ?4,
                affiliate_call_sign = ?5, signal_type = ?6, video_type = ?7,
                tru_resolution = ?8, updated_at = CURRENT_TIMESTAMP
            WHERE station_id = ?1 AND lineup_id = ?2
            "#,
        )?;
        for sl in &batch.station_lineups {
            let values: &[&dyn ToSql] = &[
                &sl.station_id,
                &sl.lineup_id,
                &sl.channel_number,
                &sl.affiliate_id,
                &sl.affiliate_call_sign,
                &sl.signal_type,
                &sl.video_type,
                &sl.tru_resolution,
            ];
            if insert.execute(values)? > 0 {
                counts.relationships += 1;
            } else {
                update.execute(values)?;
            }
        }
    }

    Ok(counts)
}
