//! Progress reporting
//!
//! The store writer reports every finished unit to a [`ProgressObserver`].
//! [`LoggingObserver`] is the default and emits a rate/ETA line at most once
//! per interval; the CLI swaps in a progress bar.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

use super::stats::PhaseStats;
use crate::app::registry::{Phase, UnitKey};
use crate::constants::progress;

/// How a unit finished, as seen by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitResult {
    /// Committed; carries the number of new rows
    Done { rows: u64 },
    NoData,
    Failed,
}

/// Receives writer-side progress events
///
/// Called from the writer thread; implementations must be cheap.
pub trait ProgressObserver: Send + Sync {
    fn phase_started(&self, _phase: Phase, _pending: usize, _skipped: usize) {}

    fn unit_finished(&self, _phase: Phase, _key: &UnitKey, _result: UnitResult) {}

    fn phase_finished(&self, _stats: &PhaseStats) {}
}

/// Observer that ignores every event
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

#[derive(Debug)]
struct LogState {
    phase: Phase,
    total: usize,
    processed: usize,
    failed: usize,
    started: Instant,
    last_log: Instant,
}

/// Periodic progress lines through `tracing`
#[derive(Debug)]
pub struct LoggingObserver {
    interval: Duration,
    state: Mutex<Option<LogState>>,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::new(progress::LOG_INTERVAL)
    }
}

impl LoggingObserver {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(None),
        }
    }
}

/// Estimated time remaining given progress so far
pub fn eta(processed: usize, total: usize, elapsed: Duration) -> Option<Duration> {
    if processed == 0 || processed >= total {
        return None;
    }
    let per_unit = elapsed.as_secs_f64() / processed as f64;
    Some(Duration::from_secs_f64(per_unit * (total - processed) as f64))
}

impl ProgressObserver for LoggingObserver {
    fn phase_started(&self, phase: Phase, pending: usize, skipped: usize) {
        info!(
            "Starting {}: {} units pending, {} already done",
            phase, pending, skipped
        );
        let now = Instant::now();
        if let Ok(mut state) = self.state.lock() {
            *state = Some(LogState {
                phase,
                total: pending,
                processed: 0,
                failed: 0,
                started: now,
                last_log: now,
            });
        }
    }

    fn unit_finished(&self, _phase: Phase, _key: &UnitKey, result: UnitResult) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let Some(state) = guard.as_mut() else {
            return;
        };

        state.processed += 1;
        if result == UnitResult::Failed {
            state.failed += 1;
        }

        if state.last_log.elapsed() < self.interval {
            return;
        }
        state.last_log = Instant::now();

        let elapsed = state.started.elapsed();
        let rate = state.processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let eta = eta(state.processed, state.total, elapsed)
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "-".to_string());
        info!(
            "{}: {}/{} ({:.1}/s, {} failed, ETA {})",
            state.phase, state.processed, state.total, rate, state.failed, eta
        );
    }

    fn phase_finished(&self, stats: &PhaseStats) {
        info!(
            "Finished {}: {} done, {} without data, {} failed in {:.1}s{}",
            stats.phase,
            stats.done,
            stats.no_data,
            stats.failed,
            stats.elapsed.as_secs_f64(),
            if stats.interrupted { " (interrupted)" } else { "" }
        );
        if let Ok(mut state) = self.state.lock() {
            *state = None;
        }
    }
}
