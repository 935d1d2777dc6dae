//! Data models for the lineup database builder
//!
//! Normalized records produced by the ingestion producers and applied by the
//! store writer. Identifiers (`station_id`, `lineup_id`) are opaque strings
//! assigned by the remote source and are never synthesized locally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A geographic service area identified by (country, postal code)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Market {
    /// ISO 3166-1 alpha-3 country code, upper case
    pub country: String,
    /// Postal code, already normalized for the country
    pub postal_code: String,
}

impl Market {
    pub fn new(country: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            postal_code: postal_code.into(),
        }
    }

    /// Registry key for this market (`USA/90210`)
    pub fn key(&self) -> String {
        format!("{}/{}", self.country, self.postal_code)
    }

    /// Line used when hashing the market set (`USA,90210`)
    pub fn hash_line(&self) -> String {
        format!("{},{}", self.country, self.postal_code)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.country, self.postal_code)
    }
}

/// A TV provider's channel list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineup {
    pub lineup_id: String,
    pub name: String,
    pub location: Option<String>,
    /// Cable, satellite, OTA, virtual and so on
    pub lineup_type: Option<String>,
    pub device: Option<String>,
    pub mso_id: Option<String>,
    pub mso_name: Option<String>,
}

/// Station logo metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logo {
    pub uri: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub category: Option<String>,
    pub primary: Option<bool>,
}

/// Minimal station record observed in a lineup listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStation {
    pub station_id: String,
    pub call_sign: Option<String>,
    pub logo: Logo,
}

/// Per-listing attributes of a station inside one lineup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationLineup {
    pub station_id: String,
    pub lineup_id: String,
    pub channel_number: Option<String>,
    pub affiliate_id: Option<String>,
    pub affiliate_call_sign: Option<String>,
    pub signal_type: Option<String>,
    pub video_type: Option<String>,
    pub tru_resolution: Option<String>,
}

/// One entry of a lineup's station listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationListing {
    pub station: BaseStation,
    pub lineup: StationLineup,
}

/// Association recording which markets a lineup serves
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineupMarket {
    pub lineup_id: String,
    pub country: String,
    pub postal_code: String,
}

/// Fully enriched station metadata from the detail endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationDetail {
    pub station_id: String,
    pub call_sign: Option<String>,
    pub name: Option<String>,
    pub station_type: Option<String>,
    pub bcast_langs: Vec<String>,
    pub logo: Logo,
}

/// A base station awaiting enhancement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationRef {
    pub station_id: String,
    pub call_sign: Option<String>,
}

impl StationRef {
    pub fn new(station_id: impl Into<String>, call_sign: Option<String>) -> Self {
        Self {
            station_id: station_id.into(),
            call_sign,
        }
    }
}

/// Every normalized record fetched for one market
///
/// Applied by the store writer in a single transaction, in dependency order:
/// market, lineups, lineup markets, base stations, station lineups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketBatch {
    pub market: Market,
    pub lineups: Vec<Lineup>,
    pub lineup_markets: Vec<LineupMarket>,
    pub stations: Vec<BaseStation>,
    pub station_lineups: Vec<StationLineup>,
    /// Drop the market's existing lineup associations before writing
    pub replace_existing: bool,
}

impl MarketBatch {
    /// Batch with no lineups (market legitimately has no data)
    pub fn empty(market: Market) -> Self {
        Self {
            market,
            lineups: Vec::new(),
            lineup_markets: Vec::new(),
            stations: Vec::new(),
            station_lineups: Vec::new(),
            replace_existing: false,
        }
    }

    /// Number of records carried by this batch
    pub fn record_count(&self) -> usize {
        1 + self.lineups.len()
            + self.lineup_markets.len()
            + self.stations.len()
            + self.station_lineups.len()
    }
}

/// A unit of writes handed from a producer to the store writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBatch {
    Market(MarketBatch),
    Station(StationDetail),
}

impl WriteBatch {
    pub fn record_count(&self) -> usize {
        match self {
            WriteBatch::Market(batch) => batch.record_count(),
            WriteBatch::Station(_) => 1,
        }
    }
}

/// Rows newly inserted by one write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCounts {
    pub markets: u64,
    pub lineups: u64,
    pub stations: u64,
    /// New station_lineups rows
    pub relationships: u64,
    pub lineup_markets: u64,
    pub enhanced: u64,
}

impl WriteCounts {
    pub fn merge(&mut self, other: &WriteCounts) {
        self.markets += other.markets;
        self.lineups += other.lineups;
        self.stations += other.stations;
        self.relationships += other.relationships;
        self.lineup_markets += other.lineup_markets;
        self.enhanced += other.enhanced;
    }

    pub fn total_rows(&self) -> u64 {
        self.markets + self.lineups + self.stations + self.relationships + self.lineup_markets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_keys() {
        let market = Market::new("USA", "90210");
        assert_eq!(market.key(), "USA/90210");
        assert_eq!(market.hash_line(), "USA,90210");
        assert_eq!(market.to_string(), "USA,90210");
    }

    #[test]
    fn test_batch_record_count() {
        let mut batch = MarketBatch::empty(Market::new("USA", "90210"));
        assert_eq!(batch.record_count(), 1);

        batch.lineups.push(Lineup {
            lineup_id: "USA-CA00000-X".to_string(),
            name: "Cable".to_string(),
            location: None,
            lineup_type: Some("CABLE".to_string()),
            device: None,
            mso_id: None,
            mso_name: None,
        });
        batch.lineup_markets.push(LineupMarket {
            lineup_id: "USA-CA00000-X".to_string(),
            country: "USA".to_string(),
            postal_code: "90210".to_string(),
        });
        assert_eq!(batch.record_count(), 3);
        assert_eq!(WriteBatch::Market(batch).record_count(), 3);
    }

    #[test]
    fn test_write_counts_merge() {
        let mut total = WriteCounts::default();
        total.merge(&WriteCounts {
            stations: 2,
            relationships: 3,
            ..Default::default()
        });
        total.merge(&WriteCounts {
            lineups: 1,
            ..Default::default()
        });
        assert_eq!(total.stations, 2);
        assert_eq!(total.total_rows(), 6);
    }
}
