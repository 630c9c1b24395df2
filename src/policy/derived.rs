use derive_getters::Getters;
use serde::Serialize;

use crate::error::{ControlError, Result};
use crate::options::{ColumnFamilyOptions, CompactionStyle, ImmutableCfOptions};

/// Per-level size limits computed from one [`ColumnFamilyOptions`] value.
///
/// Every vector has one entry per level, index 0 being level 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct DerivedLimits {
    max_file_size: Vec<u64>,
    max_grandparent_overlap_bytes: Vec<u64>,
    expanded_compaction_byte_size_limit: Vec<u64>,
    source_compaction_byte_size_limit: Vec<u64>,
    /// Level 0 is bounded by file count, its entry repeats `max_bytes_for_level_base`.
    max_bytes_for_level: Vec<u64>,
}

/// `value * multiplier`, keeping `u64::MAX` (unbounded) unbounded unless `multiplier` is 0.
pub fn multiply_check_overflow(what: &'static str, value: u64, multiplier: u64) -> Result<u64> {
    if multiplier == 0 {
        return Ok(0);
    }
    if value == u64::MAX {
        return Ok(u64::MAX);
    }
    value
        .checked_mul(multiplier)
        .ok_or(ControlError::ConfigOverflow {
            what,
            value,
            multiplier,
        })
}

pub fn refresh_derived(
    options: &ColumnFamilyOptions,
    immutable: &ImmutableCfOptions,
) -> Result<DerivedLimits> {
    let num_levels = immutable.num_levels;
    let base = options.target_file_size_base;

    let mut max_file_size: Vec<u64> = Vec::with_capacity(num_levels);
    for level in 0..num_levels {
        let size = match level {
            0 if immutable.compaction_style == CompactionStyle::Universal => u64::MAX,
            0 | 1 => base,
            _ => multiply_check_overflow(
                "max_file_size",
                max_file_size[level - 1],
                options.target_file_size_multiplier.into(),
            )?,
        };
        max_file_size.push(size);
    }

    let scale = |what: &'static str, factor: u32| -> Result<Vec<u64>> {
        max_file_size
            .iter()
            .map(|&size| multiply_check_overflow(what, size, factor.into()))
            .collect()
    };
    let max_grandparent_overlap_bytes = scale(
        "max_grandparent_overlap_bytes",
        options.max_grandparent_overlap_factor,
    )?;
    let expanded_compaction_byte_size_limit = scale(
        "expanded_compaction_byte_size_limit",
        options.expanded_compaction_factor,
    )?;
    let source_compaction_byte_size_limit = scale(
        "source_compaction_byte_size_limit",
        options.source_compaction_factor,
    )?;

    let mut max_bytes_for_level: Vec<u64> = Vec::with_capacity(num_levels);
    for level in 0..num_levels {
        let bytes = match level {
            0 | 1 => options.max_bytes_for_level_base,
            _ => {
                let additional = options
                    .max_bytes_for_level_multiplier_additional
                    .get(level - 1)
                    .copied()
                    .unwrap_or(1);
                let grown = multiply_check_overflow(
                    "max_bytes_for_level",
                    max_bytes_for_level[level - 1],
                    options.max_bytes_for_level_multiplier.into(),
                )?;
                multiply_check_overflow("max_bytes_for_level", grown, additional.into())?
            }
        };
        max_bytes_for_level.push(bytes);
    }

    Ok(DerivedLimits {
        max_file_size,
        max_grandparent_overlap_bytes,
        expanded_compaction_byte_size_limit,
        source_compaction_byte_size_limit,
        max_bytes_for_level,
    })
}
