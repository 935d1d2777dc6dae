//! Producer pool configuration
//!
//! One [`WorkerConfig`] per phase: ingestion runs few producers issuing
//! several requests per unit, enhancement runs more producers issuing one.

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use crate::constants::workers;
use crate::errors::{ConfigError, ConfigResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent producers
    pub worker_count: usize,
    /// Hard cap on `worker_count`
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::ingestion()
    }
}

impl WorkerConfig {
    pub fn ingestion() -> Self {
        Self {
            worker_count: workers::DEFAULT_INGEST_WORKERS,
            max_workers: workers::MAX_INGEST_WORKERS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn enhancement() -> Self {
        Self {
            worker_count: workers::DEFAULT_ENHANCE_WORKERS,
            max_workers: workers::MAX_ENHANCE_WORKERS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Clamp `count` into `1..=max_workers`, returning the value used
    pub fn clamp_worker_count(&mut self, count: usize) -> usize {
        self.worker_count = count.clamp(1, self.max_workers.max(1));
        self.worker_count
    }

    pub fn validate(&self, field: &str) -> ConfigResult<()> {
        if self.worker_count == 0 {
            return Err(ConfigError::invalid(field, 0, "must be at least 1"));
        }
        if self.worker_count > self.max_workers {
            return Err(ConfigError::invalid(
                field,
                self.worker_count,
                format!("must not exceed {}", self.max_workers),
            ));
        }
        self.retry.validate()
    }
}
