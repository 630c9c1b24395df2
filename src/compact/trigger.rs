use derive_new::new;
use ordered_float::OrderedFloat;

use crate::level::LevelMetadata;
use crate::options::OptionsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct LevelScore {
    pub level: usize,
    /// At least 1 means the level needs compaction.
    pub score: OrderedFloat<f64>,
}

/// Scores of every level that can be a compaction input, highest first.
///
/// Level 0 is scored by file count against its trigger and by bytes against the level base.
/// Other levels are scored by bytes against their capacity. Files already being compacted
/// do not count.
pub fn compaction_scores(options: &OptionsSnapshot, meta: &LevelMetadata) -> Vec<LevelScore> {
    let cf = options.options();
    let last_input_level = options.num_levels().saturating_sub(1);
    let mut scores: Vec<LevelScore> = (0..last_input_level)
        .map(|level| {
            let score = if level == 0 {
                let files = meta
                    .files(0)
                    .iter()
                    .filter(|file| !file.being_compacted())
                    .count();
                let by_count = files as f64 / f64::from(cf.level0_file_num_compaction_trigger);
                let by_bytes =
                    meta.compactable_bytes(0) as f64 / cf.max_bytes_for_level_base as f64;
                by_count.max(by_bytes)
            } else {
                let capacity = options.max_bytes_for_level(level).unwrap_or(u64::MAX);
                meta.compactable_bytes(level) as f64 / capacity as f64
            };
            LevelScore::new(level, OrderedFloat(score))
        })
        .collect();
    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores
}

/// Whether the background compaction should look for work.
///
/// Every level from 1 on counts, the last one included: an overfull last level is reported
/// even though it never scores as a compaction input.
pub fn should_trigger_compaction(options: &OptionsSnapshot, meta: &LevelMetadata) -> bool {
    let cf = options.options();
    if cf.disable_auto_compactions {
        return false;
    }
    if meta.l0_file_count() >= cf.level0_file_num_compaction_trigger as usize {
        return true;
    }
    (1..options.num_levels()).any(|level| {
        options
            .max_bytes_for_level(level)
            .is_ok_and(|capacity| meta.level_bytes(level) > capacity)
    })
}
