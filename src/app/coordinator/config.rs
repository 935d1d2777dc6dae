//! Configuration for the ingestion and enhancement phases

use serde::{Deserialize, Serialize};

use crate::app::worker::{RetryPolicy, WorkerConfig};
use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub ingestion: WorkerConfig,
    pub enhancement: WorkerConfig,
    /// Maximum fetched-but-unwritten units
    pub queue_capacity: usize,
    /// Committed units between full registry snapshots
    pub snapshot_every: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ingestion: WorkerConfig::ingestion(),
            enhancement: WorkerConfig::enhancement(),
            queue_capacity: workers::DEFAULT_QUEUE_CAPACITY,
            snapshot_every: workers::DEFAULT_SNAPSHOT_EVERY,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_ingest_workers(mut self, count: usize) -> Self {
        self.ingestion.worker_count = count;
        self
    }

    pub fn with_enhance_workers(mut self, count: usize) -> Self {
        self.enhancement.worker_count = count;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_snapshot_every(mut self, every: usize) -> Self {
        self.snapshot_every = every;
        self
    }

    /// Use the same retry policy for both phases
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.ingestion.retry = retry.clone();
        self.enhancement.retry = retry;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.ingestion.validate("ingestion.workers")?;
        self.enhancement.validate("enhancement.workers")?;

        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "ingestion.queue_capacity",
                0,
                "must be at least 1",
            ));
        }
        if self.snapshot_every == 0 {
            return Err(ConfigError::invalid(
                "ingestion.snapshot_every",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
