//! Shared fakes for the integration tests
//!
//! [`FakeApi`] serves scripted markets from memory and counts calls.
//! [`InstrumentedStore`] wraps an in-memory [`SqliteStore`] with write
//! latency, commit counting, and fault or cancellation hooks. Both can share
//! an [`InFlight`] tracker that measures fetched-but-uncommitted markets.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lineup_builder::app::registry::{Checkpoint, FailureRecord};
use lineup_builder::app::store::{SqliteStore, TableCounts};
use lineup_builder::app::{
    BaseStation, BuildOptions, CheckpointRegistry, CheckpointRetention, Coordinator,
    CoordinatorConfig, Lineup, LineupApi, Logo, Market, MarketBatch, MarketSetHash,
    RetryPolicy, ShutdownSignal, StationDetail, StationLineup, StationListing, StationRef,
    StationStore, WriteCounts,
};
use lineup_builder::errors::{ApiError, ApiResult, StoreError, StoreResult};

/// How a scripted market answers `fetch_lineups`
#[derive(Debug, Clone)]
enum MarketScript {
    Lineups(Vec<String>),
    /// Fail transiently this many times, then serve the lineups
    Flaky { failures: usize, lineups: Vec<String> },
    AlwaysTransient,
    Fatal,
}

/// Fetched-but-uncommitted market counter shared by the fake API and store
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    pub fn started(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn committed(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Scripted in-memory lineup API
#[derive(Debug, Default)]
pub struct FakeApi {
    markets: HashMap<String, MarketScript>,
    lineup_stations: HashMap<String, Vec<(String, String)>>,
    details: HashMap<String, StationDetail>,
    fetch_delay: Duration,
    in_flight: Option<Arc<InFlight>>,
    lineup_calls: Mutex<HashMap<String, usize>>,
    station_calls: AtomicUsize,
    detail_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Market served by `lineup_ids`
    pub fn with_market(mut self, country: &str, postal_code: &str, lineup_ids: &[&str]) -> Self {
        self.markets.insert(
            Market::new(country, postal_code).key(),
            MarketScript::Lineups(to_strings(lineup_ids)),
        );
        self
    }

    /// Lineup listing `(station_id, call_sign)` pairs
    pub fn with_lineup(mut self, lineup_id: &str, stations: &[(&str, &str)]) -> Self {
        self.lineup_stations.insert(
            lineup_id.to_string(),
            stations
                .iter()
                .map(|(id, call_sign)| (id.to_string(), call_sign.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_flaky_market(
        mut self,
        country: &str,
        postal_code: &str,
        failures: usize,
        lineup_ids: &[&str],
    ) -> Self {
        self.markets.insert(
            Market::new(country, postal_code).key(),
            MarketScript::Flaky {
                failures,
                lineups: to_strings(lineup_ids),
            },
        );
        self
    }

    pub fn with_transient_market(mut self, country: &str, postal_code: &str) -> Self {
        self.markets.insert(
            Market::new(country, postal_code).key(),
            MarketScript::AlwaysTransient,
        );
        self
    }

    pub fn with_fatal_market(mut self, country: &str, postal_code: &str) -> Self {
        self.markets
            .insert(Market::new(country, postal_code).key(), MarketScript::Fatal);
        self
    }

    /// Detail answer for a station
    pub fn with_detail(mut self, station_id: &str, name: &str) -> Self {
        self.details.insert(
            station_id.to_string(),
            StationDetail {
                station_id: station_id.to_string(),
                call_sign: None,
                name: Some(name.to_string()),
                station_type: Some("Basic Broadcast".to_string()),
                bcast_langs: vec!["en".to_string()],
                logo: Logo::default(),
            },
        );
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn with_in_flight(mut self, tracker: Arc<InFlight>) -> Self {
        self.in_flight = Some(tracker);
        self
    }

    /// `fetch_lineups` calls for one market
    pub fn lineup_calls(&self, market: &Market) -> usize {
        self.lineup_calls
            .lock()
            .unwrap()
            .get(&market.key())
            .copied()
            .unwrap_or(0)
    }

    /// Distinct markets `fetch_lineups` was called for
    pub fn markets_fetched(&self) -> usize {
        self.lineup_calls.lock().unwrap().len()
    }

    pub fn total_lineup_calls(&self) -> usize {
        self.lineup_calls.lock().unwrap().values().sum()
    }

    pub fn station_calls(&self) -> usize {
        self.station_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    fn lineup(&self, lineup_id: &str) -> Lineup {
        Lineup {
            lineup_id: lineup_id.to_string(),
            name: format!("Lineup {lineup_id}"),
            location: None,
            lineup_type: Some("CAB".to_string()),
            device: None,
            mso_id: None,
            mso_name: None,
        }
    }

    fn record_lineup_call(&self, key: &str) -> usize {
        let mut calls = self.lineup_calls.lock().unwrap();
        let count = calls.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

impl LineupApi for FakeApi {
    async fn fetch_lineups(&self, market: &Market) -> ApiResult<Vec<Lineup>> {
        let key = market.key();
        let call = self.record_lineup_call(&key);
        let resource = format!("lineups {key}");

        let script = self.markets.get(&key).cloned();
        let lineup_ids = match script {
            None => return Err(ApiError::not_found(resource)),
            Some(MarketScript::Lineups(ids)) => ids,
            Some(MarketScript::Flaky { failures, lineups }) => {
                if call <= failures {
                    return Err(ApiError::transient(resource, "HTTP 503"));
                }
                lineups
            }
            Some(MarketScript::AlwaysTransient) => {
                return Err(ApiError::transient(resource, "connection refused"))
            }
            Some(MarketScript::Fatal) => {
                return Err(ApiError::fatal(resource, "expected a JSON array"))
            }
        };

        if lineup_ids.is_empty() {
            return Err(ApiError::not_found(resource));
        }
        if let Some(tracker) = &self.in_flight {
            tracker.started();
        }
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        Ok(lineup_ids.iter().map(|id| self.lineup(id)).collect())
    }

    async fn fetch_stations(&self, lineup_id: &str) -> ApiResult<Vec<StationListing>> {
        self.station_calls.fetch_add(1, Ordering::SeqCst);
        let stations = self
            .lineup_stations
            .get(lineup_id)
            .filter(|stations| !stations.is_empty())
            .ok_or_else(|| ApiError::not_found(format!("stations of {lineup_id}")))?;

        Ok(stations
            .iter()
            .enumerate()
            .map(|(index, (station_id, call_sign))| StationListing {
                station: BaseStation {
                    station_id: station_id.clone(),
                    call_sign: Some(call_sign.clone()),
                    logo: Logo::default(),
                },
                lineup: StationLineup {
                    station_id: station_id.clone(),
                    lineup_id: lineup_id.to_string(),
                    channel_number: Some((index + 2).to_string()),
                    affiliate_id: None,
                    affiliate_call_sign: None,
                    signal_type: None,
                    video_type: None,
                    tru_resolution: None,
                },
            })
            .collect())
    }

    async fn fetch_station_detail(&self, station: &StationRef) -> ApiResult<StationDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .get(&station.station_id)
            .cloned()
            .map(|mut detail| {
                detail.call_sign = station.call_sign.clone();
                detail
            })
            .ok_or_else(|| ApiError::not_found(format!("station {}", station.station_id)))
    }
}

/// Store wrapper with latency, commit counting, and fault hooks
pub struct InstrumentedStore {
    inner: SqliteStore,
    write_latency: Duration,
    commits: Arc<AtomicUsize>,
    committed_markets: Arc<Mutex<Vec<String>>>,
    /// Commit succeeds, then the call reports an error
    fail_after_commit: Option<usize>,
    shutdown_after: Option<(usize, ShutdownSignal)>,
    in_flight: Option<Arc<InFlight>>,
}

impl InstrumentedStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            write_latency: Duration::ZERO,
            commits: Arc::new(AtomicUsize::new(0)),
            committed_markets: Arc::new(Mutex::new(Vec::new())),
            fail_after_commit: None,
            shutdown_after: None,
            in_flight: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(SqliteStore::open_in_memory().unwrap())
    }

    pub fn with_write_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// Make market commit number `n` (1-based) report an error after committing
    pub fn with_fault_after_commit(mut self, n: usize) -> Self {
        self.fail_after_commit = Some(n);
        self
    }

    /// Trigger `shutdown` once `n` markets have committed
    pub fn with_shutdown_after(mut self, n: usize, shutdown: ShutdownSignal) -> Self {
        self.shutdown_after = Some((n, shutdown));
        self
    }

    pub fn with_in_flight(mut self, tracker: Arc<InFlight>) -> Self {
        self.in_flight = Some(tracker);
        self
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn committed_markets(&self) -> Vec<String> {
        self.committed_markets.lock().unwrap().clone()
    }

    /// Handle on the commit log that outlives the store
    pub fn commit_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.committed_markets)
    }

    pub fn inner(&self) -> &SqliteStore {
        &self.inner
    }

    pub fn into_inner(self) -> SqliteStore {
        self.inner
    }

    pub fn counts(&self) -> TableCounts {
        self.inner.table_counts().unwrap()
    }
}

impl StationStore for InstrumentedStore {
    fn apply_market_batch(&mut self, batch: &MarketBatch) -> StoreResult<WriteCounts> {
        if !self.write_latency.is_zero() {
            std::thread::sleep(self.write_latency);
        }
        let counts = self.inner.apply_market_batch(batch)?;

        let commit = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        self.committed_markets
            .lock()
            .unwrap()
            .push(batch.market.key());
        if let Some(tracker) = &self.in_flight {
            tracker.committed();
        }

        if let Some((after, shutdown)) = &self.shutdown_after {
            if commit >= *after {
                shutdown.trigger();
            }
        }
        if self.fail_after_commit == Some(commit) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        Ok(counts)
    }

    fn apply_station_detail(&mut self, detail: &StationDetail) -> StoreResult<WriteCounts> {
        if !self.write_latency.is_zero() {
            std::thread::sleep(self.write_latency);
        }
        self.inner.apply_station_detail(detail)
    }

    fn base_stations(&self) -> StoreResult<Vec<StationRef>> {
        self.inner.base_stations()
    }

    fn record_failure(&mut self, process_type: &str, failure: &FailureRecord) -> StoreResult<()> {
        self.inner.record_failure(process_type, failure)
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set_metadata(key, value)
    }

    fn rebuild_indexes(&mut self) -> StoreResult<()> {
        self.inner.rebuild_indexes()
    }
}

/// `n` markets `USA,10000`.. each with one lineup and one station of its own
pub fn numbered_markets(n: usize) -> (Vec<Market>, FakeApi) {
    let mut api = FakeApi::new();
    let mut markets = Vec::with_capacity(n);
    for i in 0..n {
        let postal = format!("{:05}", 10000 + i);
        let lineup = format!("L{i}");
        let station = format!("S{i}");
        let call_sign = format!("W{i:03}");
        api = api
            .with_market("USA", &postal, &[&lineup])
            .with_lineup(&lineup, &[(&station, &call_sign)]);
        markets.push(Market::new("USA", postal));
    }
    (markets, api)
}

/// Shared station S1 in two lineups of USA,90210
pub fn beverly_hills_api() -> FakeApi {
    FakeApi::new()
        .with_market("USA", "90210", &["L1", "L2"])
        .with_lineup("L1", &[("S1", "KABC"), ("S2", "KCBS")])
        .with_lineup("L2", &[("S1", "KABC"), ("S3", "KNBC")])
}

/// Coordinator configuration without retry delays
pub fn test_config(workers: usize, queue_capacity: usize) -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_ingest_workers(workers)
        .with_enhance_workers(workers)
        .with_queue_capacity(queue_capacity)
        .with_snapshot_every(2)
        .with_retry(RetryPolicy::immediate(3))
}

pub fn coordinator(api: Arc<FakeApi>, config: CoordinatorConfig) -> Coordinator<FakeApi> {
    Coordinator::new(api, config).unwrap()
}

pub fn registry_path(dir: &Path) -> PathBuf {
    dir.join("lineup_registry.json")
}

/// Options keeping the checkpoint after success, so re-runs can inspect it
pub fn keep_options(dir: &Path) -> BuildOptions {
    BuildOptions {
        registry_path: registry_path(dir),
        retention: CheckpointRetention::Keep,
        ..BuildOptions::default()
    }
}

/// Live checkpoint for `markets`
pub fn load_checkpoint(dir: &Path, markets: &[Market]) -> Option<Checkpoint> {
    CheckpointRegistry::load(&registry_path(dir), &MarketSetHash::from_markets(markets)).unwrap()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
