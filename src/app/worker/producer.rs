//! Producers: fetch one unit of work and turn it into a write batch
//!
//! Producers never touch the store or the registry. Each loop iteration
//! reserves a queue slot first, then claims a unit, fetches it, and hands the
//! outcome to the store writer. Per-unit errors become [`UnitOutcome::Failed`]
//! and never stop the loop.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::retry::RetryPolicy;
use crate::app::client::LineupApi;
use crate::app::coordinator::signals::ShutdownSignal;
use crate::app::models::{
    BaseStation, Lineup, LineupMarket, Market, MarketBatch, StationLineup, StationRef,
    WriteBatch,
};
use crate::app::queue::{BatchSender, WorkQueue};
use crate::app::registry::{FailureRecord, UnitKey};
use crate::errors::ApiError;

/// What a producer made of one unit
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// Rows to commit
    Ingested(WriteBatch),
    /// Remote has nothing for this unit; done without rows
    NoData,
    /// Retry budget exhausted or fatal response
    Failed(FailureRecord),
}

/// A unit outcome travelling through the batch queue
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedUnit {
    pub key: UnitKey,
    pub outcome: UnitOutcome,
}

/// Fetch-and-transform strategy for one kind of unit
pub trait UnitProducer: Send + Sync + 'static {
    type Unit: Send + 'static;

    fn unit_key(&self, unit: &Self::Unit) -> UnitKey;

    fn produce(&self, unit: Self::Unit) -> impl Future<Output = UnitOutcome> + Send;
}

fn failure(key: &UnitKey, attempts: u32, error: &ApiError) -> UnitOutcome {
    UnitOutcome::Failed(FailureRecord::new(
        key.clone(),
        error.kind(),
        attempts,
        error.to_string(),
    ))
}

/// Ingestion: one market → lineups → stations per lineup
#[derive(Debug)]
pub struct MarketProducer<A> {
    api: Arc<A>,
    retry: RetryPolicy,
    replace_existing: bool,
}

impl<A: LineupApi> MarketProducer<A> {
    pub fn new(api: Arc<A>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            replace_existing: false,
        }
    }

    /// Replace each market's lineup associations instead of merging (force refresh)
    pub fn with_replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    async fn produce_market(&self, market: Market) -> UnitOutcome {
        let key = UnitKey::Market(market.key());
        let resource = format!("lineups {}", market.key());

        let attempted = self
            .retry
            .run(&resource, || self.api.fetch_lineups(&market))
            .await;
        let lineups = match &attempted.result {
            Ok(lineups) if !lineups.is_empty() => lineups.clone(),
            Ok(_) | Err(ApiError::NotFound { .. }) => {
                debug!("Market {} has no lineups", market.key());
                return UnitOutcome::NoData;
            }
            Err(e) => return failure(&key, attempted.attempts, e),
        };

        let mut batch = MarketBatch::empty(market);
        batch.replace_existing = self.replace_existing;

        for lineup in lineups {
            let resource = format!("stations {}", lineup.lineup_id);
            let attempted = self
                .retry
                .run(&resource, || self.api.fetch_stations(&lineup.lineup_id))
                .await;

            let listings = match attempted.result {
                Ok(listings) => listings,
                Err(ApiError::NotFound { .. }) => {
                    debug!("Lineup {} has no stations", lineup.lineup_id);
                    Vec::new()
                }
                Err(e) => return failure(&key, attempted.attempts, &e),
            };

            push_lineup(&mut batch, lineup, listings.into_iter().map(|l| (l.station, l.lineup)));
        }

        UnitOutcome::Ingested(WriteBatch::Market(batch))
    }
}

fn push_lineup(
    batch: &mut MarketBatch,
    lineup: Lineup,
    listings: impl Iterator<Item = (BaseStation, StationLineup)>,
) {
    batch.lineup_markets.push(LineupMarket {
        lineup_id: lineup.lineup_id.clone(),
        country: batch.market.country.clone(),
        postal_code: batch.market.postal_code.clone(),
    });
    for (station, station_lineup) in listings {
        batch.stations.push(station);
        batch.station_lineups.push(station_lineup);
    }
    batch.lineups.push(lineup);
}

impl<A: LineupApi> UnitProducer for MarketProducer<A> {
    type Unit = Market;

    fn unit_key(&self, market: &Market) -> UnitKey {
        UnitKey::Market(market.key())
    }

    fn produce(&self, market: Market) -> impl Future<Output = UnitOutcome> + Send {
        self.produce_market(market)
    }
}

/// Enhancement: one base station → its detail record
#[derive(Debug)]
pub struct StationProducer<A> {
    api: Arc<A>,
    retry: RetryPolicy,
}

impl<A: LineupApi> StationProducer<A> {
    pub fn new(api: Arc<A>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    async fn produce_station(&self, station: StationRef) -> UnitOutcome {
        let key = UnitKey::Station(station.station_id.clone());
        let resource = format!("station {}", station.station_id);

        let attempted = self
            .retry
            .run(&resource, || self.api.fetch_station_detail(&station))
            .await;
        match attempted.result {
            Ok(detail) => UnitOutcome::Ingested(WriteBatch::Station(detail)),
            Err(ApiError::NotFound { .. }) => UnitOutcome::NoData,
            Err(e) => failure(&key, attempted.attempts, &e),
        }
    }
}

impl<A: LineupApi> UnitProducer for StationProducer<A> {
    type Unit = StationRef;

    fn unit_key(&self, station: &StationRef) -> UnitKey {
        UnitKey::Station(station.station_id.clone())
    }

    fn produce(&self, station: StationRef) -> impl Future<Output = UnitOutcome> + Send {
        self.produce_station(station)
    }
}

/// Per-producer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Units handed to the writer
    pub produced: usize,
    /// Units claimed but dropped on shutdown
    pub abandoned: usize,
}

/// Producer loop: runs until the work queue is empty, shutdown, or the writer is gone
pub async fn run_producer<P: UnitProducer>(
    id: usize,
    producer: Arc<P>,
    units: Arc<WorkQueue<P::Unit>>,
    queue: BatchSender<ProducedUnit>,
    shutdown: ShutdownSignal,
) -> ProducerStats {
    debug!("Producer {} starting", id);
    let mut stats = ProducerStats::default();

    loop {
        if shutdown.is_triggered() {
            break;
        }

        let slot = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            slot = queue.reserve() => match slot {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };

        let Some(unit) = units.next().await else {
            break;
        };
        let key = producer.unit_key(&unit);

        let outcome = tokio::select! {
            biased;
            _ = shutdown.wait() => {
                debug!("Producer {} abandoning {} on shutdown", id, key);
                stats.abandoned += 1;
                break;
            }
            outcome = producer.produce(unit) => outcome,
        };

        if let UnitOutcome::Failed(ref failure) = outcome {
            warn!(
                "{} failed after {} attempt(s): {}",
                key, failure.attempts, failure.message
            );
        }

        if slot.send(ProducedUnit { key, outcome }).await.is_err() {
            debug!("Producer {}: store writer gone", id);
            break;
        }
        stats.produced += 1;
    }

    debug!(
        "Producer {} finished ({} produced, {} abandoned)",
        id, stats.produced, stats.abandoned
    );
    stats
}
