use std::collections::HashSet;
use std::sync::Arc;

use crate::level::{FileMetadata, KeyRange};

/// Files per level as last installed by a flush or compaction.
///
/// Level 0 files may overlap each other and are kept newest first. Files of every other
/// level are disjoint and sorted by smallest key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelMetadata {
    levels: Vec<Vec<Arc<FileMetadata>>>,
    pending_compaction_bytes: u64,
}

impl LevelMetadata {
    pub fn new(mut levels: Vec<Vec<Arc<FileMetadata>>>) -> Self {
        for files in levels.iter_mut().skip(1) {
            files.sort_by(|a, b| a.smallest().cmp(b.smallest()));
        }
        Self {
            levels,
            pending_compaction_bytes: 0,
        }
    }

    pub fn empty(num_levels: usize) -> Self {
        Self::new(vec![Vec::new(); num_levels])
    }

    pub fn with_pending_compaction_bytes(self, pending_compaction_bytes: u64) -> Self {
        Self {
            pending_compaction_bytes,
            ..self
        }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn l0_file_count(&self) -> usize {
        self.files(0).len()
    }

    pub fn pending_compaction_bytes(&self) -> u64 {
        self.pending_compaction_bytes
    }

    /// Empty past the last level.
    pub fn files(&self, level: usize) -> &[Arc<FileMetadata>] {
        self.levels
            .get(level)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn level_bytes(&self, level: usize) -> u64 {
        self.files(level).iter().map(|file| file.size()).sum()
    }

    /// Bytes of `level` that no running compaction has claimed.
    pub fn compactable_bytes(&self, level: usize) -> u64 {
        self.files(level)
            .iter()
            .filter(|file| !file.being_compacted())
            .map(|file| file.size())
            .sum()
    }

    pub fn overlapping_files(&self, level: usize, range: &KeyRange) -> Vec<Arc<FileMetadata>> {
        self.files(level)
            .iter()
            .filter(|file| file.overlaps(range))
            .cloned()
            .collect()
    }

    /// Copy with the `removed` files dropped and `added` placed into `level`. Added level 0
    /// files are the newest, so they go first.
    pub fn apply_edit(
        &self,
        removed: &HashSet<u64>,
        level: usize,
        added: impl IntoIterator<Item = Arc<FileMetadata>>,
    ) -> Self {
        let mut levels: Vec<Vec<Arc<FileMetadata>>> = self
            .levels
            .iter()
            .map(|files| {
                files
                    .iter()
                    .filter(|file| !removed.contains(&file.id()))
                    .cloned()
                    .collect()
            })
            .collect();
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        let added = added
            .into_iter()
            .map(|file| {
                if file.being_compacted() {
                    Arc::new(file.with_being_compacted(false))
                } else {
                    file
                }
            });
        if level == 0 {
            levels[0].splice(0..0, added);
        } else {
            levels[level].extend(added);
        }
        Self::new(levels).with_pending_compaction_bytes(self.pending_compaction_bytes)
    }

    /// Copy with the given files flagged (or unflagged) as inputs of a running compaction.
    pub fn mark_being_compacted(&self, ids: &HashSet<u64>, being_compacted: bool) -> Self {
        let levels = self
            .levels
            .iter()
            .map(|files| {
                files
                    .iter()
                    .map(|file| {
                        if ids.contains(&file.id()) {
                            Arc::new(file.with_being_compacted(being_compacted))
                        } else {
                            file.clone()
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            levels,
            pending_compaction_bytes: self.pending_compaction_bytes,
        }
    }
}
