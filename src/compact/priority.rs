use std::cmp::Reverse;
use std::sync::Arc;

use itertools::Itertools;

use crate::level::FileMetadata;
use crate::options::CompactionPri;

/// Orders the files of a level by how urgently each should be compacted.
pub trait FilePriority: Send + Sync {
    fn prioritize(
        &self,
        files: &[Arc<FileMetadata>],
        next_level: &[Arc<FileMetadata>],
    ) -> Vec<Arc<FileMetadata>>;
}

pub fn priority_for(pri: CompactionPri) -> &'static dyn FilePriority {
    match pri {
        CompactionPri::ByCompensatedSize => &ByCompensatedSize,
        CompactionPri::OldestLargestSeqFirst => &OldestLargestSeqFirst,
        CompactionPri::OldestSmallestSeqFirst => &OldestSmallestSeqFirst,
        CompactionPri::MinOverlappingRatio => &MinOverlappingRatio,
    }
}

struct ByCompensatedSize;

impl FilePriority for ByCompensatedSize {
    fn prioritize(
        &self,
        files: &[Arc<FileMetadata>],
        _next_level: &[Arc<FileMetadata>],
    ) -> Vec<Arc<FileMetadata>> {
        files
            .iter()
            .cloned()
            .sorted_by_key(|file| Reverse(file.compensated_size()))
            .collect()
    }
}

struct OldestLargestSeqFirst;

impl FilePriority for OldestLargestSeqFirst {
    fn prioritize(
        &self,
        files: &[Arc<FileMetadata>],
        _next_level: &[Arc<FileMetadata>],
    ) -> Vec<Arc<FileMetadata>> {
        files
            .iter()
            .cloned()
            .sorted_by_key(|file| file.largest_seqno())
            .collect()
    }
}

struct OldestSmallestSeqFirst;

impl FilePriority for OldestSmallestSeqFirst {
    fn prioritize(
        &self,
        files: &[Arc<FileMetadata>],
        _next_level: &[Arc<FileMetadata>],
    ) -> Vec<Arc<FileMetadata>> {
        files
            .iter()
            .cloned()
            .sorted_by_key(|file| file.smallest_seqno())
            .collect()
    }
}

/// Least rewrite amplification first: bytes overlapped in the next level per byte of the file.
struct MinOverlappingRatio;

impl FilePriority for MinOverlappingRatio {
    fn prioritize(
        &self,
        files: &[Arc<FileMetadata>],
        next_level: &[Arc<FileMetadata>],
    ) -> Vec<Arc<FileMetadata>> {
        files
            .iter()
            .cloned()
            .sorted_by_cached_key(|file| {
                let range = file.range();
                let overlapping: u64 = next_level
                    .iter()
                    .filter(|next| next.overlaps(&range))
                    .map(|next| next.size())
                    .sum();
                u128::from(overlapping) * 1024 / u128::from(file.compensated_size().max(1))
            })
            .collect()
    }
}
