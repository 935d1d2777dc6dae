//! Phase orchestration: producers, the store writer, and the build pipeline
//!
//! A phase runs N producer tasks that pull pending units from a
//! [`WorkQueue`](crate::app::queue::WorkQueue), fetch them through the
//! [`LineupApi`], and push outcomes onto the bounded batch queue. One
//! [`StoreWriter`] on a blocking thread drains the queue. The store and the
//! checkpoint registry move into the writer for the duration of the phase and
//! are handed back when it ends, so nothing else can write while it runs.
//!
//! - [`config`] - per-phase worker counts, queue capacity, snapshot cadence
//! - [`signals`] - the shared [`ShutdownSignal`]
//! - [`progress`] - the [`ProgressObserver`] interface and the logging observer
//! - [`stats`] - [`PhaseStats`] and the end-of-run [`BuildSummary`]
//! - [`pipeline`] - [`run_build`]: ingestion → enhancement → indexing
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lineup_builder::app::{
//!     CheckpointRegistry, ClientConfig, Coordinator, CoordinatorConfig, LineupClient, Market,
//!     MarketSetHash, SqliteStore,
//! };
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(LineupClient::new(&ClientConfig::default())?);
//! let coordinator = Coordinator::new(api, CoordinatorConfig::default())?;
//!
//! let markets = vec![Market::new("USA", "90210")];
//! let registry = CheckpointRegistry::open(
//!     Path::new("lineup_registry.json"),
//!     MarketSetHash::from_markets(&markets),
//!     markets.len(),
//!     false,
//! )?;
//! let store = SqliteStore::open(Path::new("lineups.db"))?;
//!
//! let run = coordinator.ingest(&markets, store, registry, false).await?;
//! println!("{} markets committed", run.stats.done);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pipeline;
pub mod progress;
pub mod signals;
pub mod stats;

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::app::client::LineupApi;
use crate::app::models::Market;
use crate::app::queue::{batch_queue, WorkQueue};
use crate::app::registry::{CheckpointRegistry, Phase};
use crate::app::store::StationStore;
use crate::app::worker::{
    run_producer, MarketProducer, StationProducer, StoreWriter, UnitProducer, WorkerConfig,
};
use crate::errors::{AppError, CoordinatorError};

pub use config::CoordinatorConfig;
pub use pipeline::{run_build, BuildOptions, BuildOutcome};
pub use progress::{LoggingObserver, NoopObserver, ProgressObserver, UnitResult};
pub use signals::{listen_for_signals, ShutdownSignal};
pub use stats::{BuildSummary, PhaseStats};

/// Store and registry handed back after a phase, with its statistics
#[derive(Debug)]
pub struct PhaseRun<S> {
    pub store: S,
    pub registry: CheckpointRegistry,
    pub stats: PhaseStats,
}

/// Runs ingestion and enhancement phases against one remote API
pub struct Coordinator<A> {
    api: Arc<A>,
    config: CoordinatorConfig,
    shutdown: ShutdownSignal,
    observer: Arc<dyn ProgressObserver>,
}

impl<A: LineupApi> Coordinator<A> {
    /// Create a coordinator; the configuration is validated here
    pub fn new(api: Arc<A>, config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        config.validate()?;
        Ok(Self {
            api,
            config,
            shutdown: ShutdownSignal::new(),
            observer: Arc::new(LoggingObserver::default()),
        })
    }

    /// Share an externally owned shutdown signal (for example the OS signal listener's)
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Ingest every market the checkpoint does not already mark done
    ///
    /// With `replace_existing`, each fetched market's lineup associations
    /// replace the stored ones instead of being merged.
    pub async fn ingest<S: StationStore>(
        &self,
        markets: &[Market],
        store: S,
        registry: CheckpointRegistry,
        replace_existing: bool,
    ) -> Result<PhaseRun<S>, AppError> {
        let pending = registry.pending_markets(markets);
        let skipped = markets.len() - pending.len();

        let producer = MarketProducer::new(Arc::clone(&self.api), self.config.ingestion.retry.clone())
            .with_replace_existing(replace_existing);

        self.run_phase(
            Phase::Ingestion,
            producer,
            &self.config.ingestion,
            pending,
            skipped,
            store,
            registry,
        )
        .await
    }

    /// Enhance every base station the checkpoint does not already mark done
    pub async fn enhance<S: StationStore>(
        &self,
        store: S,
        registry: CheckpointRegistry,
    ) -> Result<PhaseRun<S>, AppError> {
        let base = store.base_stations()?;
        let base_count = base.len();
        let pending = registry.pending_stations(base);
        let skipped = base_count - pending.len();

        let producer =
            StationProducer::new(Arc::clone(&self.api), self.config.enhancement.retry.clone());

        self.run_phase(
            Phase::Enhancement,
            producer,
            &self.config.enhancement,
            pending,
            skipped,
            store,
            registry,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phase<P, S>(
        &self,
        phase: Phase,
        producer: P,
        workers: &WorkerConfig,
        pending: Vec<P::Unit>,
        skipped: usize,
        store: S,
        mut registry: CheckpointRegistry,
    ) -> Result<PhaseRun<S>, AppError>
    where
        P: UnitProducer,
        S: StationStore,
    {
        let started = Instant::now();
        registry.set_phase(phase)?;

        let pending_count = pending.len();
        self.observer.phase_started(phase, pending_count, skipped);

        let units = Arc::new(WorkQueue::new(pending));
        let (sender, receiver) = batch_queue(self.config.queue_capacity);

        let writer = StoreWriter::new(
            store,
            registry,
            phase,
            self.config.snapshot_every,
            Arc::clone(&self.observer),
            self.shutdown.clone(),
        );
        let writer_handle = tokio::task::spawn_blocking(move || writer.run(receiver));

        let producer = Arc::new(producer);
        let producer_count = workers.worker_count.min(pending_count);
        info!(
            "{}: {} producers, queue capacity {}",
            phase,
            producer_count,
            sender.capacity()
        );

        let mut producers = JoinSet::new();
        for id in 0..producer_count {
            producers.spawn(run_producer(
                id,
                Arc::clone(&producer),
                Arc::clone(&units),
                sender.clone(),
                self.shutdown.clone(),
            ));
        }
        // Writer finishes once every producer's sender is gone
        drop(sender);

        let mut producer_failure = None;
        let mut abandoned = 0;
        while let Some(joined) = producers.join_next().await {
            match joined {
                Ok(stats) => abandoned += stats.abandoned,
                Err(e) => {
                    error!("{} producer task failed: {}", phase, e);
                    producer_failure = Some(e.to_string());
                }
            }
        }

        let output = writer_handle
            .await
            .map_err(|e| CoordinatorError::TaskFailed {
                task: format!("{} store writer", phase),
                reason: e.to_string(),
            })??;

        if let Some(reason) = producer_failure {
            return Err(CoordinatorError::TaskFailed {
                task: format!("{} producer", phase),
                reason,
            }
            .into());
        }

        let mut stats = output.stats;
        stats.pending = pending_count;
        stats.skipped = skipped;
        stats.elapsed = started.elapsed();
        stats.interrupted = self.shutdown.is_triggered() && stats.processed() < pending_count;
        if stats.interrupted {
            info!(
                "{} interrupted: {} units left for the next run ({} abandoned in flight)",
                phase,
                stats.unprocessed(),
                abandoned
            );
        }
        self.observer.phase_finished(&stats);

        Ok(PhaseRun {
            store: output.store,
            registry: output.registry,
            stats,
        })
    }
}
