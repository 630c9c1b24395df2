use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Which file of a level is compacted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPri {
    /// Largest compensated size first, deletions count extra.
    #[default]
    ByCompensatedSize,
    /// The file whose newest entry is oldest, i.e. data that has not been updated for a while.
    OldestLargestSeqFirst,
    /// The file holding the oldest data first.
    OldestSmallestSeqFirst,
    /// Smallest ratio between the bytes it overlaps in the next level and its own size.
    MinOverlappingRatio,
}

impl CompactionPri {
    pub const ALL: [CompactionPri; 4] = [
        CompactionPri::ByCompensatedSize,
        CompactionPri::OldestLargestSeqFirst,
        CompactionPri::OldestSmallestSeqFirst,
        CompactionPri::MinOverlappingRatio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CompactionPri::ByCompensatedSize => "by_compensated_size",
            CompactionPri::OldestLargestSeqFirst => "oldest_largest_seq_first",
            CompactionPri::OldestSmallestSeqFirst => "oldest_smallest_seq_first",
            CompactionPri::MinOverlappingRatio => "min_overlapping_ratio",
        }
    }
}

impl Display for CompactionPri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompactionPri {
    type Err = ControlError;

    /// Accepts `by_compensated_size` as well as `kByCompensatedSize`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .trim_start_matches('k')
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .into_iter()
            .find(|pri| pri.name().replace('_', "") == normalized)
            .ok_or_else(|| ControlError::invalid_option("compaction_pri", format!("`{s}`")))
    }
}
