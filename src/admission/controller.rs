use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::admission::{
    AdmissionDecision, AtomicWriteAdmission, DelayPolicy, ProportionalDelay, WriteAdmission,
    evaluate_admission,
};
use crate::level::LevelMetadata;
use crate::options::OptionsSnapshot;

const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(100);

fn saturating_micros(delay: Duration) -> u64 {
    u64::try_from(delay.as_micros()).unwrap_or(u64::MAX)
}

/// Where the controller reads the state it decides on. Both values are re-read on every
/// evaluation.
pub trait StallSource: Send + Sync {
    fn options(&self) -> Arc<OptionsSnapshot>;

    fn level_metadata(&self) -> Arc<LevelMetadata>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StallStats {
    /// Writes that had to wait in `Stop` at least once.
    pub stopped_writes: u64,
    pub delayed_writes: u64,
    pub total_delay: Duration,
}

pub struct WriteController<D = ProportionalDelay> {
    delay: D,
    recheck_interval: Duration,
    progress: Notify,
    last_admission: AtomicWriteAdmission,
    stopped_writes: AtomicU64,
    delayed_writes: AtomicU64,
    total_delay_micros: AtomicU64,
}

impl Default for WriteController {
    fn default() -> Self {
        Self::new(ProportionalDelay::default())
    }
}

impl<D: DelayPolicy> WriteController<D> {
    pub fn new(delay: D) -> Self {
        Self {
            delay,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            progress: Notify::new(),
            last_admission: AtomicWriteAdmission::new(WriteAdmission::Normal),
            stopped_writes: AtomicU64::new(0),
            delayed_writes: AtomicU64::new(0),
            total_delay_micros: AtomicU64::new(0),
        }
    }

    /// Upper bound on how long a stopped writer sleeps without being signalled.
    pub fn with_recheck_interval(mut self, recheck_interval: Duration) -> Self {
        self.recheck_interval = recheck_interval;
        self
    }

    /// Waits until a write may proceed. Returns `Normal` or `Slowdown`, never `Stop`.
    pub async fn admit(&self, source: &impl StallSource) -> WriteAdmission {
        let mut counted_stop = false;
        loop {
            // registered before the state is read, so a signal in between is not lost
            let mut progress = pin!(self.progress.notified());
            progress.as_mut().enable();

            let options = source.options();
            let meta = source.level_metadata();
            let l0_files = meta.l0_file_count();
            let pending = meta.pending_compaction_bytes();
            let decision = evaluate_admission(options.options(), l0_files, pending);
            self.record(decision, l0_files, pending);

            match decision.admission {
                WriteAdmission::Normal => return WriteAdmission::Normal,
                WriteAdmission::Slowdown => {
                    let delay = self.delay.delay(options.options(), l0_files, pending);
                    self.delayed_writes.fetch_add(1, Ordering::Relaxed);
                    let micros = saturating_micros(delay);
                    self.total_delay_micros
                        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                            Some(total.saturating_add(micros))
                        })
                        .ok();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    return WriteAdmission::Slowdown;
                }
                WriteAdmission::Stop => {
                    if !counted_stop {
                        counted_stop = true;
                        self.stopped_writes.fetch_add(1, Ordering::Relaxed);
                    }
                    // Timing out is fine, the state is evaluated again either way.
                    let _ = tokio::time::timeout(self.recheck_interval, progress).await;
                }
            }
        }
    }

    /// Wakes every stopped writer so it re-evaluates. Called after each flush or compaction
    /// and after each options change.
    pub fn signal_progress(&self) {
        self.progress.notify_waiters();
    }

    pub fn last_admission(&self) -> WriteAdmission {
        self.last_admission.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> StallStats {
        StallStats {
            stopped_writes: self.stopped_writes.load(Ordering::Relaxed),
            delayed_writes: self.delayed_writes.load(Ordering::Relaxed),
            total_delay: Duration::from_micros(self.total_delay_micros.load(Ordering::Relaxed)),
        }
    }

    fn record(&self, decision: AdmissionDecision, l0_files: usize, pending: u64) {
        let previous = self
            .last_admission
            .swap(decision.admission, Ordering::AcqRel);
        if previous == decision.admission {
            return;
        }
        match decision.admission {
            WriteAdmission::Normal => {
                debug!(?previous, l0_files, pending, "write stall cleared")
            }
            admission => info!(
                ?admission,
                cause = ?decision.cause,
                l0_files,
                pending,
                "write stall"
            ),
        }
    }
}
