use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::options::ColumnFamilyOptions;

/// How long a write in [`Slowdown`](crate::admission::WriteAdmission::Slowdown) waits.
pub trait DelayPolicy: Send + Sync + 'static {
    fn delay(
        &self,
        options: &ColumnFamilyOptions,
        l0_files: usize,
        pending_compaction_bytes: u64,
    ) -> Duration;
}

/// Grows linearly from `base` to `max` as level 0 moves from the slowdown to the stop trigger,
/// or pending bytes move from the soft to the hard limit, whichever is further along.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ProportionalDelay {
    #[builder(default = Duration::from_millis(1))]
    base: Duration,
    #[builder(default = Duration::from_millis(100))]
    max: Duration,
}

impl Default for ProportionalDelay {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn progress(value: u64, low: u64, high: u64) -> f64 {
    if value < low {
        0.0
    } else if high <= low {
        1.0
    } else {
        ((value - low) as f64 / (high - low) as f64).min(1.0)
    }
}

impl DelayPolicy for ProportionalDelay {
    fn delay(
        &self,
        options: &ColumnFamilyOptions,
        l0_files: usize,
        pending_compaction_bytes: u64,
    ) -> Duration {
        let l0 = progress(
            l0_files as u64,
            options.level0_slowdown_writes_trigger.into(),
            options.level0_stop_writes_trigger.into(),
        );
        let soft = options.soft_pending_compaction_bytes_limit;
        let hard = options.hard_pending_compaction_bytes_limit;
        let pending = if soft == 0 || hard == 0 {
            0.0
        } else {
            progress(pending_compaction_bytes, soft, hard)
        };
        let span = self.max.saturating_sub(self.base);
        let extra = (span.as_nanos() as f64 * l0.max(pending)).round() as u64;
        (self.base + Duration::from_nanos(extra)).min(self.max)
    }
}
