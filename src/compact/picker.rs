use std::sync::Arc;

use tracing::debug;

use crate::compact::{CompactionTask, FilePriority, compaction_scores, priority_for};
use crate::error::{ControlError, Result};
use crate::level::{FileMetadata, KeyRange, LevelMetadata};
use crate::options::OptionsSnapshot;

/// Chooses what to compact next.
///
/// Files are ranked by the strategy named in the options unless a custom [`FilePriority`]
/// is installed.
#[derive(Default)]
pub struct CompactionPicker {
    priority: Option<Arc<dyn FilePriority>>,
}

fn total_bytes<'a>(files: impl IntoIterator<Item = &'a Arc<FileMetadata>>) -> u64 {
    files.into_iter().map(|file| file.size()).sum()
}

fn covering(files: &[Arc<FileMetadata>]) -> Option<KeyRange> {
    KeyRange::covering(files.iter().map(Arc::as_ref))
}

fn any_being_compacted(files: &[Arc<FileMetadata>]) -> bool {
    files.iter().any(|file| file.being_compacted())
}

impl CompactionPicker {
    pub fn with_priority(priority: Arc<dyn FilePriority>) -> Self {
        Self {
            priority: Some(priority),
        }
    }

    fn priority<'a>(&'a self, options: &OptionsSnapshot) -> &'a dyn FilePriority {
        match &self.priority {
            Some(priority) => priority.as_ref(),
            None => priority_for(options.options().compaction_pri),
        }
    }

    /// Initial inputs for a compaction out of `level`, empty when nothing can be picked.
    ///
    /// Level 0 files overlap each other, so all of them are taken, and none while any of them
    /// is already being compacted. On other levels the first file in priority order is taken
    /// that is free, within the compaction file size limit, and whose next-level overlap is free.
    pub fn pick_files(
        &self,
        options: &OptionsSnapshot,
        level: usize,
        meta: &LevelMetadata,
    ) -> Vec<Arc<FileMetadata>> {
        let files = meta.files(level);
        if level == 0 {
            if any_being_compacted(files) {
                return Vec::new();
            }
            return files.to_vec();
        }

        let size_limit = options.max_file_size_for_compaction();
        self.priority(options)
            .prioritize(files, meta.files(level + 1))
            .into_iter()
            .find(|file| {
                !file.being_compacted()
                    && file.size() <= size_limit
                    && !any_being_compacted(&meta.overlapping_files(level + 1, &file.range()))
            })
            .into_iter()
            .collect()
    }

    /// Picks the most urgent compaction, `Ok(None)` when no level needs one.
    ///
    /// Fails with [`ControlError::Disabled`] when auto compactions are switched off.
    pub fn pick_compaction(
        &self,
        options: &Arc<OptionsSnapshot>,
        meta: &LevelMetadata,
    ) -> Result<Option<CompactionTask>> {
        if options.options().disable_auto_compactions {
            return Err(ControlError::Disabled);
        }
        for score in compaction_scores(options, meta) {
            if score.score.0 < 1.0 {
                break;
            }
            let inputs = self.pick_files(options, score.level, meta);
            let Some(range) = covering(&inputs) else {
                continue;
            };
            let outputs = meta.overlapping_files(score.level + 1, &range);
            if any_being_compacted(&outputs) {
                continue;
            }
            let (inputs, outputs) = expand_inputs(options, meta, score.level, inputs, outputs)?;
            debug!(
                level = score.level,
                score = score.score.0,
                inputs = inputs.len(),
                outputs = outputs.len(),
                "picked compaction"
            );
            return self
                .build_task(options, meta, score.level, inputs, outputs, false)
                .map(Some);
        }
        Ok(None)
    }

    /// Manual compaction of the files of `level` overlapping `range` into the next level.
    /// Works regardless of `disable_auto_compactions`.
    ///
    /// Inputs from levels other than 0 are cut off once they reach the source compaction
    /// limit. `Ok(None)` when nothing overlaps or the files are busy.
    pub fn pick_range_compaction(
        &self,
        options: &Arc<OptionsSnapshot>,
        meta: &LevelMetadata,
        level: usize,
        range: &KeyRange,
    ) -> Result<Option<CompactionTask>> {
        if level + 1 >= options.num_levels() {
            return Err(ControlError::InvalidLevel {
                level,
                num_levels: options.num_levels(),
            });
        }
        let mut inputs = overlapping_inputs(meta, level, range);
        if level > 0 {
            let limit = options.source_compaction_byte_size_limit(level)?;
            let mut total = 0u64;
            if let Some(last) = inputs.iter().position(|file| {
                total = total.saturating_add(file.size());
                total >= limit
            }) {
                inputs.truncate(last + 1);
            }
        }
        let Some(input_range) = covering(&inputs) else {
            return Ok(None);
        };
        if any_being_compacted(&inputs) {
            return Ok(None);
        }
        let outputs = meta.overlapping_files(level + 1, &input_range);
        if any_being_compacted(&outputs) {
            return Ok(None);
        }
        self.build_task(options, meta, level, inputs, outputs, true)
            .map(Some)
    }

    fn build_task(
        &self,
        options: &Arc<OptionsSnapshot>,
        meta: &LevelMetadata,
        level: usize,
        inputs: Vec<Arc<FileMetadata>>,
        outputs: Vec<Arc<FileMetadata>>,
        manual: bool,
    ) -> Result<CompactionTask> {
        let all = inputs.iter().chain(&outputs).cloned().collect::<Vec<_>>();
        let grandparents = match covering(&all) {
            Some(range) if level + 2 < options.num_levels() => {
                meta.overlapping_files(level + 2, &range)
            }
            _ => Vec::new(),
        };
        CompactionTask::new(options.clone(), level, inputs, outputs, grandparents, manual)
    }
}

/// Files of `level` overlapping `range`. On level 0 the range grows until it also covers
/// every file overlapping the ones already found, older versions of a key must not be left
/// behind.
fn overlapping_inputs(
    meta: &LevelMetadata,
    level: usize,
    range: &KeyRange,
) -> Vec<Arc<FileMetadata>> {
    let mut inputs = meta.overlapping_files(level, range);
    if level > 0 {
        return inputs;
    }
    loop {
        let Some(covered) = covering(&inputs) else {
            return inputs;
        };
        let grown = meta.overlapping_files(0, &covered);
        if grown.len() == inputs.len() {
            return inputs;
        }
        inputs = grown;
    }
}

/// Grows the inputs to every file of `level` inside the range already being rewritten, as
/// long as that pulls in no further output-level file and stays within both the expanded
/// compaction size and the grandparent overlap limits. Otherwise the pick is left unchanged.
fn expand_inputs(
    options: &OptionsSnapshot,
    meta: &LevelMetadata,
    level: usize,
    inputs: Vec<Arc<FileMetadata>>,
    outputs: Vec<Arc<FileMetadata>>,
) -> Result<(Vec<Arc<FileMetadata>>, Vec<Arc<FileMetadata>>)> {
    let all = inputs.iter().chain(&outputs).cloned().collect::<Vec<_>>();
    let Some(all_range) = covering(&all) else {
        return Ok((inputs, outputs));
    };
    if outputs.is_empty() {
        return Ok((inputs, outputs));
    }

    let expanded = meta.overlapping_files(level, &all_range);
    if expanded.len() <= inputs.len() || any_being_compacted(&expanded) {
        return Ok((inputs, outputs));
    }
    let file_size_limit = options.max_file_size_for_compaction();
    if expanded.iter().any(|file| file.size() > file_size_limit) {
        debug!(level, file_size_limit, "expansion pulls in an oversized file");
        return Ok((inputs, outputs));
    }

    let output_bytes = total_bytes(&outputs);
    let expanded_bytes = total_bytes(&expanded);
    let size_limit = options.expanded_compaction_byte_size_limit(level)?;
    if expanded_bytes.saturating_add(output_bytes) >= size_limit {
        debug!(level, expanded_bytes, output_bytes, size_limit, "expansion too large");
        return Ok((inputs, outputs));
    }

    let Some(expanded_range) = covering(&expanded) else {
        return Ok((inputs, outputs));
    };
    let expanded_outputs = meta.overlapping_files(level + 1, &expanded_range);
    if expanded_outputs.len() != outputs.len() {
        return Ok((inputs, outputs));
    }

    if level + 2 < options.num_levels() {
        let grandparent_bytes =
            total_bytes(&meta.overlapping_files(level + 2, &expanded_range.union(&all_range)));
        let overlap_limit = options.max_grandparent_overlap_bytes(level)?;
        if grandparent_bytes > overlap_limit {
            debug!(level, grandparent_bytes, overlap_limit, "expansion overlaps too much");
            return Ok((inputs, outputs));
        }
    }

    debug!(
        level,
        from = inputs.len(),
        to = expanded.len(),
        "expanded compaction inputs"
    );
    Ok((expanded, outputs))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::compact::{CompactionPicker, FilePriority};
    use crate::error::ControlError;
    use crate::level::{FileMetadata, KeyRange, LevelMetadata};
    use crate::options::{ColumnFamilyOptions, OptionsSnapshot};
    use crate::policy::CompactionFileSizeLimit;
    use crate::test_utils::{file, snapshot_with};

    fn ids(files: &[Arc<FileMetadata>]) -> Vec<u64> {
        files.iter().map(|file| file.id()).collect()
    }

    fn small_levels(options: &mut ColumnFamilyOptions) {
        options.level0_file_num_compaction_trigger = 2;
        options.max_bytes_for_level_base = 100;
        options.max_bytes_for_level_multiplier = 10;
        options.target_file_size_base = 10;
        options.expanded_compaction_factor = 25;
        options.max_grandparent_overlap_factor = 10;
        options.source_compaction_factor = 3;
    }

    fn snapshot() -> Arc<OptionsSnapshot> {
        snapshot_with(small_levels)
    }

    #[test]
    fn test_pick_level0() {
        let meta = LevelMetadata::new(vec![
            vec![file(1, "a", "f", 10), file(2, "d", "k", 10)],
            vec![file(3, "a", "c", 10), file(4, "e", "g", 10), file(5, "x", "z", 10)],
        ]);
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .unwrap();
        assert_eq!(task.level(), 0);
        assert_eq!(task.output_level(), 1);
        assert_eq!(ids(task.inputs()), vec![1, 2]);
        assert_eq!(ids(task.outputs()), vec![3, 4]);
        assert_eq!(task.max_output_file_size(), 10);
        assert!(!task.manual());
    }

    #[test]
    fn test_level0_busy() {
        let busy = file(1, "a", "f", 10).with_being_compacted(true);
        let meta = LevelMetadata::new(vec![
            vec![Arc::new(busy), file(2, "d", "k", 10), file(6, "a", "b", 10)],
            vec![],
        ]);
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap();
        assert!(task.is_none());
    }

    #[test]
    fn test_nothing_to_do_and_disabled() {
        let meta = LevelMetadata::new(vec![vec![file(1, "a", "b", 1)], vec![]]);
        assert!(CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .is_none());

        let disabled = snapshot_with(|options| {
            small_levels(options);
            options.disable_auto_compactions = true;
        });
        let err = CompactionPicker::default()
            .pick_compaction(&disabled, &meta)
            .unwrap_err();
        assert!(err.is_disabled());
    }

    #[test]
    fn test_pick_level1_by_priority() {
        let l1 = vec![
            file(10, "a", "b", 40),
            Arc::new(
                FileMetadata::builder()
                    .id(11)
                    .size(40)
                    .compensated_size(90)
                    .smallest("c")
                    .largest("d")
                    .build(),
            ),
            file(12, "e", "f", 40),
        ];
        let meta = LevelMetadata::new(vec![vec![], l1, vec![file(20, "c", "c", 5)], vec![]]);
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .unwrap();
        assert_eq!(task.level(), 1);
        assert_eq!(ids(task.inputs()), vec![11]);
        assert_eq!(ids(task.outputs()), vec![20]);
    }

    #[test]
    fn test_pick_files_skips_busy_and_oversized() {
        let options = snapshot_with(|options| {
            small_levels(options);
            options.max_file_size_for_compaction = Some(CompactionFileSizeLimit::new(|| 50u64));
        });
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![
                file(10, "a", "b", 60),
                Arc::new(file(11, "c", "d", 45).with_being_compacted(true)),
                file(12, "e", "f", 40),
                file(13, "g", "h", 30),
            ],
            vec![Arc::new(file(20, "e", "e", 1).with_being_compacted(true))],
        ]);
        let picked = CompactionPicker::default().pick_files(&options, 1, &meta);
        assert_eq!(ids(&picked), vec![13]);
    }

    #[test]
    fn test_expansion_skips_oversized_files() {
        let options = snapshot_with(|options| {
            small_levels(options);
            options.expanded_compaction_factor = 100;
            options.max_file_size_for_compaction = Some(CompactionFileSizeLimit::new(|| 70u64));
        });
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![file(10, "a", "b", 60), file(11, "c", "d", 65), file(12, "e", "f", 500)],
            vec![file(20, "a", "h", 30)],
        ]);
        let task = CompactionPicker::default()
            .pick_compaction(&options, &meta)
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![11]);
        assert_eq!(ids(task.outputs()), vec![20]);
        assert!(task.inputs().iter().all(|file| file.size() <= 70));
    }

    #[test]
    fn test_custom_priority() {
        struct LastFirst;

        impl FilePriority for LastFirst {
            fn prioritize(
                &self,
                files: &[Arc<FileMetadata>],
                _next_level: &[Arc<FileMetadata>],
            ) -> Vec<Arc<FileMetadata>> {
                files.iter().rev().cloned().collect()
            }
        }

        let meta = LevelMetadata::new(vec![
            vec![],
            vec![file(10, "a", "b", 60), file(11, "c", "d", 60)],
            vec![],
        ]);
        let picker = CompactionPicker::with_priority(Arc::new(LastFirst));
        assert_eq!(ids(&picker.pick_files(&snapshot(), 1, &meta)), vec![11]);
    }

    #[test]
    fn test_expansion_within_limits() {
        // level 1 -> 2: picking "a..b" pulls in output "a..h", which also covers "c..d"
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![
                Arc::new(
                    FileMetadata::builder()
                        .id(10)
                        .size(60)
                        .compensated_size(100)
                        .smallest("a")
                        .largest("b")
                        .build(),
                ),
                file(11, "c", "d", 50),
            ],
            vec![file(20, "a", "h", 30)],
            vec![file(30, "a", "z", 40)],
        ]);
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![10, 11]);
        assert_eq!(ids(task.outputs()), vec![20]);
        assert!(task.input_bytes() < 250);
        assert!(task.grandparent_bytes() <= 100);
    }

    #[test]
    fn test_expansion_respects_size_limit() {
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![
                Arc::new(
                    FileMetadata::builder()
                        .id(10)
                        .size(100)
                        .compensated_size(500)
                        .smallest("a")
                        .largest("b")
                        .build(),
                ),
                file(11, "c", "d", 100),
            ],
            vec![file(20, "a", "h", 60)],
            vec![],
        ]);
        // 100 + 100 + 60 >= 250
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![10]);
        assert_eq!(ids(task.outputs()), vec![20]);
    }

    #[test]
    fn test_expansion_respects_grandparent_limit() {
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![
                Arc::new(
                    FileMetadata::builder()
                        .id(10)
                        .size(60)
                        .compensated_size(100)
                        .smallest("a")
                        .largest("b")
                        .build(),
                ),
                file(11, "c", "d", 50),
            ],
            vec![file(20, "a", "h", 30)],
            vec![file(30, "a", "b", 60), file(31, "c", "d", 60)],
        ]);
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![10]);
    }

    #[test]
    fn test_expansion_must_not_grow_outputs() {
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![
                Arc::new(
                    FileMetadata::builder()
                        .id(10)
                        .size(60)
                        .compensated_size(100)
                        .smallest("a")
                        .largest("b")
                        .build(),
                ),
                file(11, "c", "k", 50),
            ],
            vec![file(20, "a", "d", 30), file(21, "j", "m", 30)],
            vec![],
        ]);
        let task = CompactionPicker::default()
            .pick_compaction(&snapshot(), &meta)
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![10]);
        assert_eq!(ids(task.outputs()), vec![20]);
    }

    #[test]
    fn test_range_compaction() {
        let meta = LevelMetadata::new(vec![
            vec![],
            vec![
                file(10, "a", "b", 10),
                file(11, "c", "d", 10),
                file(12, "e", "f", 10),
                file(13, "g", "h", 10),
            ],
            vec![file(20, "a", "c", 10)],
            vec![],
        ]);
        let options = snapshot_with(|options| {
            small_levels(options);
            options.disable_auto_compactions = true;
        });
        let picker = CompactionPicker::default();

        // source limit is 3 * 10 bytes
        let task = picker
            .pick_range_compaction(&options, &meta, 1, &KeyRange::new("a", "z"))
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![10, 11, 12]);
        assert_eq!(ids(task.outputs()), vec![20]);
        assert!(task.manual());

        let l0 = LevelMetadata::new(vec![
            vec![file(1, "a", "c", 10), file(2, "b", "e", 10), file(3, "x", "z", 10)],
            vec![],
        ]);
        let task = picker
            .pick_range_compaction(&options, &l0, 0, &KeyRange::new("a", "a"))
            .unwrap()
            .unwrap();
        assert_eq!(ids(task.inputs()), vec![1, 2]);

        let nothing = picker
            .pick_range_compaction(&options, &meta, 1, &KeyRange::new("x", "z"))
            .unwrap();
        assert!(nothing.is_none());

        assert_eq!(
            picker
                .pick_range_compaction(&options, &meta, 6, &KeyRange::new("a", "z"))
                .unwrap_err(),
            ControlError::InvalidLevel {
                level: 6,
                num_levels: 7
            }
        );
    }
}
