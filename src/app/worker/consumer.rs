//! The single store writer
//!
//! Exactly one writer exists per phase. It owns the store and the checkpoint
//! registry, runs on a blocking thread, and handles each queued unit
//! strictly in this order:
//!
//! 1. apply the unit's rows in one committed transaction
//! 2. mark the unit done in the registry (journaled, durable)
//! 3. release the unit's queue slot
//!
//! A store or registry error stops the run: the writer triggers shutdown,
//! flushes a registry snapshot, and returns the error.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::producer::{ProducedUnit, UnitOutcome};
use crate::app::coordinator::progress::{ProgressObserver, UnitResult};
use crate::app::coordinator::signals::ShutdownSignal;
use crate::app::coordinator::stats::PhaseStats;
use crate::app::models::{WriteBatch, WriteCounts};
use crate::app::queue::BatchReceiver;
use crate::app::registry::{
    CheckpointRegistry, MarketStatus, Phase, StationStatus, UnitDone, UnitKey,
};
use crate::app::store::StationStore;
use crate::errors::AppError;

/// Everything the writer hands back once the queue is drained
#[derive(Debug)]
pub struct WriterOutput<S> {
    pub store: S,
    pub registry: CheckpointRegistry,
    pub stats: PhaseStats,
}

pub struct StoreWriter<S> {
    store: S,
    registry: CheckpointRegistry,
    phase: Phase,
    snapshot_every: usize,
    since_snapshot: usize,
    stats: PhaseStats,
    observer: Arc<dyn ProgressObserver>,
    shutdown: ShutdownSignal,
}

impl<S: StationStore> StoreWriter<S> {
    pub fn new(
        store: S,
        registry: CheckpointRegistry,
        phase: Phase,
        snapshot_every: usize,
        observer: Arc<dyn ProgressObserver>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            store,
            registry,
            phase,
            snapshot_every: snapshot_every.max(1),
            since_snapshot: 0,
            stats: PhaseStats::new(phase),
            observer,
            shutdown,
        }
    }

    /// Drain `receiver` until every producer has finished
    ///
    /// Blocks the calling thread; run it under `spawn_blocking`.
    pub fn run(
        mut self,
        mut receiver: BatchReceiver<ProducedUnit>,
    ) -> Result<WriterOutput<S>, AppError> {
        debug!("Store writer started for {}", self.phase);

        while let Some(queued) = receiver.blocking_recv() {
            if let Err(e) = self.handle(&queued.item) {
                error!("Store writer stopping on {}: {}", queued.item.key, e);
                self.shutdown.trigger();
                receiver.close();
                if let Err(snapshot_error) = self.registry.snapshot() {
                    error!("Final registry snapshot failed: {}", snapshot_error);
                }
                return Err(e);
            }
            // Slot released only now, after commit and checkpoint
            drop(queued);
        }

        self.registry.snapshot()?;
        debug!(
            "Store writer for {} drained ({} units)",
            self.phase,
            self.stats.processed()
        );

        Ok(WriterOutput {
            store: self.store,
            registry: self.registry,
            stats: self.stats,
        })
    }

    fn handle(&mut self, unit: &ProducedUnit) -> Result<(), AppError> {
        let result = match &unit.outcome {
            UnitOutcome::Ingested(batch) => {
                let (rows, done) = self.apply(batch)?;
                self.registry.mark_done(done, &rows)?;
                self.stats.done += 1;
                self.stats.rows.merge(&rows);
                UnitResult::Done {
                    rows: rows.total_rows() + rows.enhanced,
                }
            }
            UnitOutcome::NoData => {
                self.registry
                    .mark_done(no_data_done(&unit.key), &WriteCounts::default())?;
                self.stats.no_data += 1;
                debug!("{} done without data", unit.key);
                UnitResult::NoData
            }
            UnitOutcome::Failed(failure) => {
                self.store
                    .record_failure(&self.phase.to_string(), failure)?;
                self.registry.record_failure(failure.clone())?;
                self.stats.failed += 1;
                warn!(
                    "{} recorded as failed ({}, {} attempt(s))",
                    unit.key, failure.kind, failure.attempts
                );
                UnitResult::Failed
            }
        };

        self.since_snapshot += 1;
        if self.since_snapshot >= self.snapshot_every {
            self.registry.snapshot()?;
            self.since_snapshot = 0;
        }

        self.observer.unit_finished(self.phase, &unit.key, result);
        Ok(())
    }

    fn apply(&mut self, batch: &WriteBatch) -> Result<(WriteCounts, UnitDone), AppError> {
        match batch {
            WriteBatch::Market(market_batch) => {
                let rows = self.store.apply_market_batch(market_batch)?;
                info!(
                    "Committed {}: {} lineups, {} new stations, {} new channel listings",
                    market_batch.market.key(),
                    market_batch.lineups.len(),
                    rows.stations,
                    rows.relationships
                );
                let done = UnitDone::Market {
                    key: market_batch.market.key(),
                    status: MarketStatus::Ingested,
                };
                Ok((rows, done))
            }
            WriteBatch::Station(detail) => {
                let rows = self.store.apply_station_detail(detail)?;
                debug!("Enhanced station {}", detail.station_id);
                let done = UnitDone::Station {
                    id: detail.station_id.clone(),
                    status: StationStatus::Enhanced,
                };
                Ok((rows, done))
            }
        }
    }
}

fn no_data_done(key: &UnitKey) -> UnitDone {
    match key {
        UnitKey::Market(key) => UnitDone::Market {
            key: key.clone(),
            status: MarketStatus::Empty,
        },
        UnitKey::Station(id) => UnitDone::Station {
            id: id.clone(),
            status: StationStatus::NotFound,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::coordinator::progress::NoopObserver;
    use crate::app::hash::MarketSetHash;
    use crate::app::models::{
        BaseStation, Lineup, LineupMarket, Logo, Market, MarketBatch, StationLineup,
    };
    use crate::app::queue::batch_queue;
    use crate::app::registry::FailureRecord;
    use crate::app::store::SqliteStore;
    use crate::errors::ErrorKind;
    use tempfile::TempDir;

    fn market_unit(postal: &str) -> ProducedUnit {
        let market = Market::new("USA", postal);
        let lineup_id = format!("L-{postal}");
        let mut batch = MarketBatch::empty(market.clone());
        batch.lineups.push(Lineup {
            lineup_id: lineup_id.clone(),
            name: "Cable".into(),
            location: None,
            lineup_type: None,
            device: None,
            mso_id: None,
            mso_name: None,
        });
        batch.lineup_markets.push(LineupMarket {
            lineup_id: lineup_id.clone(),
            country: market.country.clone(),
            postal_code: market.postal_code.clone(),
        });
        batch.stations.push(BaseStation {
            station_id: format!("S-{postal}"),
            call_sign: None,
            logo: Logo::default(),
        });
        batch.station_lineups.push(StationLineup {
            station_id: format!("S-{postal}"),
            lineup_id,
            channel_number: None,
            affiliate_id: None,
            affiliate_call_sign: None,
            signal_type: None,
            video_type: None,
            tru_resolution: None,
        });
        ProducedUnit {
            key: UnitKey::Market(market.key()),
            outcome: UnitOutcome::Ingested(WriteBatch::Market(batch)),
        }
    }

    fn open_registry(dir: &TempDir) -> CheckpointRegistry {
        let markets = vec![Market::new("USA", "90210"), Market::new("USA", "10001")];
        CheckpointRegistry::open(
            &dir.path().join("registry.json"),
            MarketSetHash::from_markets(&markets),
            markets.len(),
            false,
        )
        .unwrap()
    }

    fn writer(dir: &TempDir) -> StoreWriter<SqliteStore> {
        StoreWriter::new(
            SqliteStore::open_in_memory().unwrap(),
            open_registry(dir),
            Phase::Ingestion,
            1,
            Arc::new(NoopObserver),
            ShutdownSignal::new(),
        )
    }

    #[tokio::test]
    async fn test_writer_commits_and_marks_done() {
        let temp_dir = TempDir::new().unwrap();
        let (sender, receiver) = batch_queue(4);

        for unit in [
            market_unit("90210"),
            ProducedUnit {
                key: UnitKey::Market("USA/10001".into()),
                outcome: UnitOutcome::NoData,
            },
            ProducedUnit {
                key: UnitKey::Market("USA/60601".into()),
                outcome: UnitOutcome::Failed(FailureRecord::new(
                    UnitKey::Market("USA/60601".into()),
                    ErrorKind::Transient,
                    3,
                    "HTTP 503",
                )),
            },
        ] {
            sender.reserve().await.unwrap().send(unit).await.unwrap();
        }
        drop(sender);

        let writer = writer(&temp_dir);
        let output = tokio::task::spawn_blocking(move || writer.run(receiver))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(output.stats.done, 1);
        assert_eq!(output.stats.no_data, 1);
        assert_eq!(output.stats.failed, 1);
        assert_eq!(output.stats.rows.stations, 1);

        let checkpoint = output.registry.checkpoint();
        assert_eq!(checkpoint.markets.get("USA/90210"), Some(&MarketStatus::Ingested));
        assert_eq!(checkpoint.markets.get("USA/10001"), Some(&MarketStatus::Empty));
        assert_eq!(checkpoint.market_failures(), 1);

        assert_eq!(output.store.table_counts().unwrap().stations, 1);
        assert_eq!(output.store.failure_log_count("ingestion").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_written_on_drain() {
        let temp_dir = TempDir::new().unwrap();
        let (sender, receiver) = batch_queue(2);
        sender
            .reserve()
            .await
            .unwrap()
            .send(market_unit("90210"))
            .await
            .unwrap();
        drop(sender);

        let writer = writer(&temp_dir);
        let market_set = writer.registry.market_set();
        let output = tokio::task::spawn_blocking(move || writer.run(receiver))
            .await
            .unwrap()
            .unwrap();
        drop(output);

        let checkpoint =
            CheckpointRegistry::load(&temp_dir.path().join("registry.json"), &market_set)
                .unwrap()
                .unwrap();
        assert!(checkpoint.markets.contains_key("USA/90210"));
    }
}
