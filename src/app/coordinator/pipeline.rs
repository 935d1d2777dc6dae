//! The full build: ingestion, enhancement, indexing
//!
//! Each step only runs if the previous one was not interrupted. The
//! checkpoint is marked completed, and the retention policy applied, only
//! after a run that was neither interrupted nor left any failed unit behind;
//! otherwise it stays in progress and the next run retries what is missing.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::info;

use super::stats::BuildSummary;
use super::Coordinator;
use crate::app::client::LineupApi;
use crate::app::hash::MarketSetHash;
use crate::app::models::Market;
use crate::app::registry::{CheckpointRegistry, CheckpointRetention, Phase, RetentionOutcome};
use crate::app::store::StationStore;
use crate::constants::files;
use crate::errors::{AppError, CoordinatorError, StoreError};

/// Options for one build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub registry_path: PathBuf,
    /// Ignore the existing checkpoint and replace stored lineup associations
    pub force_refresh: bool,
    pub skip_enhancement: bool,
    /// Only run enhancement against the existing store
    pub enhance_only: bool,
    pub retention: CheckpointRetention,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from(files::DEFAULT_REGISTRY),
            force_refresh: false,
            skip_enhancement: false,
            enhance_only: false,
            retention: CheckpointRetention::default(),
        }
    }
}

/// Summary plus the store, handed back to the caller
#[derive(Debug)]
pub struct BuildOutcome<S> {
    pub summary: BuildSummary,
    pub store: S,
}

/// Run the whole pipeline for `markets`
///
/// Per-unit failures are reported in the summary; only store, registry, and
/// task errors are returned as `Err`.
pub async fn run_build<A, S>(
    coordinator: &Coordinator<A>,
    markets: &[Market],
    mut store: S,
    options: &BuildOptions,
) -> Result<BuildOutcome<S>, AppError>
where
    A: LineupApi,
    S: StationStore,
{
    let started = Instant::now();
    let shutdown = coordinator.shutdown_signal();

    let market_set = MarketSetHash::from_markets(markets);
    let mut registry = CheckpointRegistry::open(
        &options.registry_path,
        market_set,
        markets.len(),
        options.force_refresh,
    )?;
    let mut summary = BuildSummary::new(market_set.to_hex());

    store.set_metadata("last_run", &Utc::now().to_rfc3339())?;
    store.set_metadata("force_refresh", bool_text(options.force_refresh))?;
    store.set_metadata("market_set", &market_set.to_hex())?;

    if options.enhance_only {
        info!("Enhance-only run: skipping ingestion");
    } else {
        let run = coordinator
            .ingest(markets, store, registry, options.force_refresh)
            .await?;
        store = run.store;
        registry = run.registry;
        summary.ingestion = Some(run.stats);
    }

    if options.skip_enhancement {
        info!("Skipping enhancement");
    } else if shutdown.is_triggered() {
        info!("Shutdown requested: enhancement deferred to the next run");
    } else {
        let run = coordinator.enhance(store, registry).await?;
        store = run.store;
        registry = run.registry;
        summary.enhancement = Some(run.stats);
    }

    summary.interrupted = shutdown.is_triggered();

    if summary.interrupted {
        registry.snapshot()?;
        summary.elapsed = started.elapsed();
        info!("Build interrupted; progress saved to {}", options.registry_path.display());
        return Ok(BuildOutcome { summary, store });
    }

    registry.set_phase(Phase::Indexing)?;
    store = rebuild_indexes(store).await?;
    summary.indexed = true;
    registry.set_phase(Phase::Finished)?;

    summary.elapsed = started.elapsed();
    store.set_metadata("last_completed", &Utc::now().to_rfc3339())?;
    let stats_json = serde_json::to_string(&summary).map_err(|source| StoreError::Encode {
        column: "metadata.stats",
        source,
    })?;
    store.set_metadata("stats", &stats_json)?;

    let failures = registry.failure_count();
    if failures == 0 {
        registry.mark_completed()?;
        let outcome = registry.apply_retention(options.retention)?;
        summary.retention = Some(describe_retention(&outcome));
    } else {
        info!(
            "{} units failed; checkpoint {} kept for a targeted retry",
            failures,
            market_set.short()
        );
    }

    Ok(BuildOutcome { summary, store })
}

/// Run the indexer on a blocking thread
async fn rebuild_indexes<S: StationStore>(mut store: S) -> Result<S, AppError> {
    let (store, result) = tokio::task::spawn_blocking(move || {
        let result = store.rebuild_indexes();
        (store, result)
    })
    .await
    .map_err(|e| CoordinatorError::TaskFailed {
        task: "indexer".to_string(),
        reason: e.to_string(),
    })?;
    result?;
    Ok(store)
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn describe_retention(outcome: &RetentionOutcome) -> String {
    match outcome {
        RetentionOutcome::Archived(path) => format!("archived to {}", path.display()),
        RetentionOutcome::Kept => "kept".to_string(),
        RetentionOutcome::Discarded => "discarded".to_string(),
    }
}
