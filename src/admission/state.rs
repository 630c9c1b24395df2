use atomic_enum::atomic_enum;
use derive_new::new;
use serde::Serialize;

use crate::options::ColumnFamilyOptions;

#[atomic_enum]
#[derive(PartialEq, Eq, Hash, Serialize)]
pub enum WriteAdmission {
    Normal = 0,
    /// Writes go through after a delay.
    Slowdown = 1,
    /// Writes wait until flush or compaction makes progress.
    Stop = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StallCause {
    Level0Files,
    PendingCompactionBytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, new)]
pub struct AdmissionDecision {
    pub admission: WriteAdmission,
    /// `None` for [`WriteAdmission::Normal`].
    pub cause: Option<StallCause>,
}

/// Classifies a write given the current level 0 file count and pending compaction bytes.
///
/// Pending-bytes limits of 0 are disabled.
pub fn evaluate_admission(
    options: &ColumnFamilyOptions,
    l0_files: usize,
    pending_compaction_bytes: u64,
) -> AdmissionDecision {
    use StallCause::*;
    use WriteAdmission::*;

    let over = |limit: u64| limit > 0 && pending_compaction_bytes >= limit;

    if l0_files >= options.level0_stop_writes_trigger as usize {
        AdmissionDecision::new(Stop, Some(Level0Files))
    } else if over(options.hard_pending_compaction_bytes_limit) {
        AdmissionDecision::new(Stop, Some(PendingCompactionBytes))
    } else if l0_files >= options.level0_slowdown_writes_trigger as usize {
        AdmissionDecision::new(Slowdown, Some(Level0Files))
    } else if over(options.soft_pending_compaction_bytes_limit) {
        AdmissionDecision::new(Slowdown, Some(PendingCompactionBytes))
    } else {
        AdmissionDecision::new(Normal, None)
    }
}
