//! Relational schema and the indexer
//!
//! Tables are created on open. Query-acceleration indexes and the station
//! full-text table are dropped and rebuilt by [`rebuild_indexes`], which must
//! only run once the writers have reached a terminal state.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StoreResult;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS markets (
    country TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    city TEXT,
    state TEXT,
    timezone TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (country, postal_code)
);

CREATE TABLE IF NOT EXISTS lineups (
    lineup_id TEXT PRIMARY KEY,
    name TEXT,
    location TEXT,
    type TEXT,
    device TEXT,
    mso_id TEXT,
    mso_name TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS stations (
    station_id TEXT PRIMARY KEY,
    name TEXT,
    call_sign TEXT,
    type TEXT,
    bcast_langs TEXT,
    logo_uri TEXT,
    logo_width INTEGER,
    logo_height INTEGER,
    logo_category TEXT,
    logo_primary BOOLEAN,
    source TEXT NOT NULL DEFAULT 'base',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS station_lineups (
    station_id TEXT NOT NULL,
    lineup_id TEXT NOT NULL,
    channel_number TEXT,
    affiliate_id TEXT,
    affiliate_call_sign TEXT,
    signal_type TEXT,
    video_type TEXT,
    tru_resolution TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (station_id, lineup_id),
    FOREIGN KEY (station_id) REFERENCES stations(station_id),
    FOREIGN KEY (lineup_id) REFERENCES lineups(lineup_id)
);

CREATE TABLE IF NOT EXISTS lineup_markets (
    lineup_id TEXT NOT NULL,
    country TEXT NOT NULL,
    postal_code TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (lineup_id, country, postal_code),
    FOREIGN KEY (lineup_id) REFERENCES lineups(lineup_id),
    FOREIGN KEY (country, postal_code) REFERENCES markets(country, postal_code)
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS processing_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    process_type TEXT NOT NULL,
    target_id TEXT,
    status TEXT,
    message TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

/// (index name, table and column expression)
pub const INDEXES: &[(&str, &str)] = &[
    ("idx_lineups_type", "lineups(type)"),
    ("idx_lineup_markets_market", "lineup_markets(country, postal_code)"),
    ("idx_lineup_markets_lineup", "lineup_markets(lineup_id)"),
    ("idx_lineup_markets_country", "lineup_markets(country)"),
    ("idx_lineup_markets_postal", "lineup_markets(postal_code)"),
    ("idx_station_lineups_station", "station_lineups(station_id)"),
    ("idx_station_lineups_lineup", "station_lineups(lineup_id)"),
    ("idx_markets_country", "markets(country)"),
    ("idx_stations_name_lower", "stations(LOWER(name))"),
    ("idx_stations_call_lower", "stations(LOWER(call_sign))"),
    ("idx_stations_source", "stations(source)"),
    ("idx_processing_log_type", "processing_log(process_type)"),
    ("idx_processing_log_target", "processing_log(target_id)"),
];

pub const FTS_TABLE: &str = "stations_fts";

const FTS_REBUILD_SQL: &str = r#"
DROP TABLE IF EXISTS stations_fts;
CREATE VIRTUAL TABLE stations_fts USING fts5(station_id UNINDEXED, name, call_sign);
INSERT INTO stations_fts (station_id, name, call_sign)
    SELECT station_id, COALESCE(name, ''), COALESCE(call_sign, '') FROM stations;
"#;

pub fn create_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    debug!("Schema ready");
    Ok(())
}

/// Drop and recreate every index plus the full-text table
///
/// Idempotent; runs in one transaction.
pub fn rebuild_indexes(conn: &mut Connection) -> StoreResult<()> {
    info!("Rebuilding {} indexes and {}", INDEXES.len(), FTS_TABLE);

    let tx = conn.transaction()?;
    for (name, target) in INDEXES {
        tx.execute_batch(&format!(
            "DROP INDEX IF EXISTS {name}; CREATE INDEX {name} ON {target};"
        ))?;
    }
    tx.execute_batch(FTS_REBUILD_SQL)?;
    tx.commit()?;

    info!("Indexes rebuilt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('markets','lineups','stations','station_lineups','lineup_markets','metadata','processing_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn test_rebuild_indexes_twice() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO stations (station_id, name, call_sign) VALUES ('S1', 'KABC ABC 7', 'KABC')",
            [],
        )
        .unwrap();

        rebuild_indexes(&mut conn).unwrap();
        rebuild_indexes(&mut conn).unwrap();

        assert_eq!(index_names(&conn).len(), INDEXES.len());

        let hit: String = conn
            .query_row(
                "SELECT station_id FROM stations_fts WHERE stations_fts MATCH 'kabc'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hit, "S1");
    }
}
