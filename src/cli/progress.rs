//! Terminal progress bar for build phases
//!
//! One bar per phase, driven by the store writer through the
//! [`ProgressObserver`] interface. The bar counts committed units only, so it
//! never runs ahead of what a resumed run would skip.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::debug;

use crate::app::coordinator::UnitResult;
use crate::app::registry::{Phase, UnitKey};
use crate::app::{PhaseStats, ProgressObserver};
use crate::constants::progress;

const BAR_TEMPLATE: &str =
    "{prefix:>12.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}, ETA {eta}) {msg}";

/// Progress bar observer
#[derive(Debug)]
pub struct ProgressBarObserver {
    draw_target: fn() -> ProgressDrawTarget,
    bar: Mutex<Option<ProgressBar>>,
    failed: AtomicUsize,
    no_data: AtomicUsize,
}

impl ProgressBarObserver {
    /// Bar drawn on stderr
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr)
    }

    /// Bar that is never drawn
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden)
    }

    fn with_draw_target(draw_target: fn() -> ProgressDrawTarget) -> Self {
        Self {
            draw_target,
            bar: Mutex::new(None),
            failed: AtomicUsize::new(0),
            no_data: AtomicUsize::new(0),
        }
    }

    /// Units shown as committed on the current bar
    pub fn position(&self) -> u64 {
        self.current().map(|bar| bar.position()).unwrap_or(0)
    }

    fn current(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|guard| guard.clone())
    }

    fn style() -> ProgressStyle {
        match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            Ok(style) => style.progress_chars("=> "),
            Err(e) => {
                debug!("Progress bar template error: {}", e);
                ProgressStyle::default_bar()
            }
        }
    }

    fn counts_message(&self, phase: Phase) -> String {
        let empty_label = match phase {
            Phase::Enhancement => "not found",
            _ => "empty",
        };
        format!(
            "{} {}, {} failed",
            self.no_data.load(Ordering::Relaxed),
            empty_label,
            self.failed.load(Ordering::Relaxed)
        )
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn phase_started(&self, phase: Phase, pending: usize, skipped: usize) {
        let bar = ProgressBar::with_draw_target(Some(pending as u64), (self.draw_target)());
        bar.set_style(Self::style());
        bar.set_prefix(phase.to_string());
        if skipped > 0 {
            bar.println(format!("{}: {} already done, skipping", phase, skipped));
        }
        bar.enable_steady_tick(progress::BAR_TICK);

        self.failed.store(0, Ordering::Relaxed);
        self.no_data.store(0, Ordering::Relaxed);
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(previous) = guard.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn unit_finished(&self, phase: Phase, _key: &UnitKey, result: UnitResult) {
        match result {
            UnitResult::Done { .. } => {}
            UnitResult::NoData => {
                self.no_data.fetch_add(1, Ordering::Relaxed);
            }
            UnitResult::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(bar) = self.current() {
            bar.inc(1);
            bar.set_message(self.counts_message(phase));
        }
    }

    fn phase_finished(&self, stats: &PhaseStats) {
        let taken = self.bar.lock().ok().and_then(|mut guard| guard.take());
        if let Some(bar) = taken {
            let verb = if stats.interrupted {
                "interrupted"
            } else {
                "done"
            };
            bar.finish_with_message(format!(
                "{} ({})",
                verb,
                self.counts_message(stats.phase)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_committed_units() {
        let observer = ProgressBarObserver::hidden();
        observer.phase_started(Phase::Ingestion, 3, 1);

        let key = UnitKey::Market("USA/90210".into());
        observer.unit_finished(Phase::Ingestion, &key, UnitResult::Done { rows: 7 });
        observer.unit_finished(Phase::Ingestion, &key, UnitResult::NoData);
        observer.unit_finished(Phase::Ingestion, &key, UnitResult::Failed);

        assert_eq!(observer.position(), 3);
        assert_eq!(
            observer.counts_message(Phase::Ingestion),
            "1 empty, 1 failed"
        );
    }

    #[test]
    fn test_phase_finish_clears_bar() {
        let observer = ProgressBarObserver::hidden();
        observer.phase_started(Phase::Enhancement, 2, 0);
        let key = UnitKey::Station("10001".into());
        observer.unit_finished(Phase::Enhancement, &key, UnitResult::NoData);
        assert_eq!(observer.counts_message(Phase::Enhancement), "1 not found, 0 failed");

        observer.phase_finished(&PhaseStats::new(Phase::Enhancement));
        assert_eq!(observer.position(), 0);
    }

    #[test]
    fn test_new_phase_resets_counts() {
        let observer = ProgressBarObserver::hidden();
        observer.phase_started(Phase::Ingestion, 1, 0);
        let key = UnitKey::Market("USA/90210".into());
        observer.unit_finished(Phase::Ingestion, &key, UnitResult::Failed);

        observer.phase_started(Phase::Enhancement, 5, 0);
        assert_eq!(observer.counts_message(Phase::Enhancement), "0 not found, 0 failed");
    }
}
