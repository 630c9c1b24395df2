use crate::level::LevelMetadata;
use crate::options::OptionsSnapshot;

/// Bytes that compaction still has to rewrite before every level fits its capacity.
///
/// Once level 0 reaches its compaction trigger its bytes count, plus the base level they
/// merge into. Every level that is over capacity (counting what is pushed down from above)
/// contributes its excess, scaled by the fan-out into the next level.
pub fn estimate_pending_compaction_bytes(options: &OptionsSnapshot, meta: &LevelMetadata) -> u64 {
    let cf = options.options();
    let l0_bytes = meta.level_bytes(0);
    let l0_triggered = meta.l0_file_count() >= cf.level0_file_num_compaction_trigger as usize
        || l0_bytes >= cf.max_bytes_for_level_base;

    let mut estimated = 0u64;
    let mut pushed_down = 0u64;
    if l0_triggered {
        estimated = l0_bytes;
        pushed_down = l0_bytes;
    }

    let num_levels = options.num_levels();
    let mut next_level_bytes = 0u64;
    for level in 1..num_levels.saturating_sub(1) {
        let mut level_bytes = if next_level_bytes > 0 {
            std::mem::take(&mut next_level_bytes)
        } else {
            meta.level_bytes(level)
        };
        if level == 1 && l0_triggered {
            estimated = estimated.saturating_add(level_bytes);
        }
        level_bytes = level_bytes.saturating_add(std::mem::take(&mut pushed_down));

        let capacity = options.max_bytes_for_level(level).unwrap_or(u64::MAX);
        if level_bytes > capacity {
            pushed_down = level_bytes - capacity;
            next_level_bytes = meta.level_bytes(level + 1);
            if next_level_bytes > 0 {
                let fan_out = next_level_bytes as f64 / level_bytes as f64 + 1.0;
                estimated = estimated.saturating_add((pushed_down as f64 * fan_out) as u64);
            }
        }
    }
    estimated
}

#[cfg(test)]
mod tests {
    use crate::level::{LevelMetadata, estimate_pending_compaction_bytes};
    use crate::options::{ColumnFamilyOptions, ImmutableCfOptions, OptionsSnapshot};
    use crate::test_utils::file;

    fn snapshot() -> OptionsSnapshot {
        let options = ColumnFamilyOptions::builder()
            .level0_file_num_compaction_trigger(4)
            .max_bytes_for_level_base(100)
            .max_bytes_for_level_multiplier(10)
            .build();
        let immutable = ImmutableCfOptions::builder().num_levels(4).build();
        OptionsSnapshot::build(options, immutable, 1).unwrap()
    }

    #[test]
    fn test_nothing_pending() {
        let meta = LevelMetadata::new(vec![
            vec![file(1, "a", "b", 10)],
            vec![file(2, "a", "b", 90)],
            vec![file(3, "a", "b", 900)],
            vec![],
        ]);
        assert_eq!(estimate_pending_compaction_bytes(&snapshot(), &meta), 0);
    }

    #[test]
    fn test_l0_trigger_and_overflowing_level() {
        let meta = LevelMetadata::new(vec![
            (1..=4).map(|id| file(id, "a", "z", 10)).collect(),
            vec![file(10, "a", "z", 90)],
            vec![file(20, "a", "z", 500)],
            vec![],
        ]);
        // 40 (L0) + 90 (L1) + 30 * (500 / 130 + 1)
        assert_eq!(estimate_pending_compaction_bytes(&snapshot(), &meta), 275);
    }

    #[test]
    fn test_excess_without_next_level_data() {
        let meta = LevelMetadata::new(vec![vec![], vec![file(10, "a", "z", 150)], vec![], vec![]]);
        assert_eq!(estimate_pending_compaction_bytes(&snapshot(), &meta), 0);

        let meta = LevelMetadata::new(vec![
            vec![],
            vec![file(10, "a", "z", 150)],
            vec![file(11, "a", "z", 100)],
            vec![],
        ]);
        // 50 * (100 / 150 + 1)
        assert_eq!(estimate_pending_compaction_bytes(&snapshot(), &meta), 83);
    }
}
