use serde::{Deserialize, Serialize};
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::error::{ControlError, Result};
use crate::options::CompactionPri;
use crate::options::parse::{parse_bool, parse_size, parse_u32, parse_u32_list};
use crate::policy::CompactionFileSizeLimit;

const MIN_ARENA_BLOCK_SIZE: u64 = 4 << 10;

/// The tunables of one column family that flush, write admission and compaction read.
///
/// A value of this type is never changed while it is published. A configuration change
/// builds a new value, which goes through [`OptionsHandle`](crate::options::OptionsHandle)
/// and replaces the old one as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
pub struct ColumnFamilyOptions {
    // memtable
    /// Rotate the active memtable once it holds this many bytes.
    #[builder(default = 64 << 20)]
    pub write_buffer_size: u64,
    /// Active plus immutable memtables that may exist before writes must wait for a flush.
    #[builder(default = 2)]
    pub max_write_buffer_number: u32,
    /// 0 is replaced by `write_buffer_size / 8` when the options are published.
    #[builder(default = 0)]
    pub arena_block_size: u64,
    /// Bits of the memtable prefix bloom filter, 0 disables it.
    #[builder(default = 0)]
    pub memtable_prefix_bloom_bits: u32,
    #[builder(default = 6)]
    pub memtable_prefix_bloom_probes: u32,
    /// Allocate the prefix bloom from huge pages of this size, 0 uses regular pages.
    #[builder(default = 0)]
    pub memtable_prefix_bloom_huge_page_tlb_size: u64,
    /// Merge operands for one key applied eagerly in the memtable, 0 for none.
    #[builder(default = 0)]
    pub max_successive_merges: u64,
    #[builder(default = false)]
    pub filter_deletes: bool,
    #[builder(default = 10000)]
    pub inplace_update_num_locks: u64,

    // write stalls
    #[builder(default = 4)]
    pub level0_file_num_compaction_trigger: u32,
    #[builder(default = 20)]
    pub level0_slowdown_writes_trigger: u32,
    #[builder(default = 24)]
    pub level0_stop_writes_trigger: u32,
    /// 0 disables the limit.
    #[builder(default = 64 << 30)]
    pub soft_pending_compaction_bytes_limit: u64,
    /// 0 disables the limit.
    #[builder(default = 256 << 30)]
    pub hard_pending_compaction_bytes_limit: u64,

    // compaction
    #[builder(default = false)]
    pub disable_auto_compactions: bool,
    #[builder(default)]
    pub compaction_pri: CompactionPri,
    #[builder(default = 64 << 20)]
    pub target_file_size_base: u64,
    #[builder(default = 1)]
    pub target_file_size_multiplier: u32,
    #[builder(default = 256 << 20)]
    pub max_bytes_for_level_base: u64,
    #[builder(default = 10)]
    pub max_bytes_for_level_multiplier: u32,
    /// Extra growth factor per level step, `[i]` applies when growing into level `i + 1`.
    #[builder(default)]
    pub max_bytes_for_level_multiplier_additional: Vec<u32>,
    #[builder(default = 10)]
    pub max_grandparent_overlap_factor: u32,
    #[builder(default = 25)]
    pub expanded_compaction_factor: u32,
    #[builder(default = 1)]
    pub source_compaction_factor: u32,
    #[builder(default = 1)]
    pub max_subcompactions: u32,
    #[builder(default = true)]
    pub verify_checksums_in_compaction: bool,
    #[builder(default = false)]
    pub paranoid_file_checks: bool,
    #[builder(default = false)]
    pub compaction_measure_io_stats: bool,
    #[builder(default = 8)]
    pub max_sequential_skip_in_iterations: u64,
    /// Upper bound on the size of files fed to or produced by a compaction, asked anew
    /// every time. Unbounded when absent.
    #[builder(default, setter(strip_option))]
    #[serde(skip)]
    pub max_file_size_for_compaction: Option<CompactionFileSizeLimit>,
}

impl Default for ColumnFamilyOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ColumnFamilyOptions {
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("write_buffer_size", self.write_buffer_size),
            ("max_write_buffer_number", self.max_write_buffer_number.into()),
            ("max_subcompactions", self.max_subcompactions.into()),
            ("target_file_size_base", self.target_file_size_base),
            ("target_file_size_multiplier", self.target_file_size_multiplier.into()),
            ("max_bytes_for_level_base", self.max_bytes_for_level_base),
            ("max_bytes_for_level_multiplier", self.max_bytes_for_level_multiplier.into()),
            (
                "level0_file_num_compaction_trigger",
                self.level0_file_num_compaction_trigger.into(),
            ),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ControlError::invalid_option(*name, "must be greater than 0"));
        }
        if self.max_bytes_for_level_multiplier_additional.contains(&0) {
            return Err(ControlError::invalid_option(
                "max_bytes_for_level_multiplier_additional",
                "multipliers must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Brings related thresholds into a consistent order.
    pub fn sanitize(mut self) -> Self {
        if self.level0_slowdown_writes_trigger < self.level0_file_num_compaction_trigger {
            warn!(
                slowdown = self.level0_slowdown_writes_trigger,
                compaction = self.level0_file_num_compaction_trigger,
                "raising level0_slowdown_writes_trigger to the compaction trigger"
            );
            self.level0_slowdown_writes_trigger = self.level0_file_num_compaction_trigger;
        }
        if self.level0_stop_writes_trigger < self.level0_slowdown_writes_trigger {
            warn!(
                stop = self.level0_stop_writes_trigger,
                slowdown = self.level0_slowdown_writes_trigger,
                "raising level0_stop_writes_trigger to the slowdown trigger"
            );
            self.level0_stop_writes_trigger = self.level0_slowdown_writes_trigger;
        }

        let soft = self.soft_pending_compaction_bytes_limit;
        let hard = self.hard_pending_compaction_bytes_limit;
        if soft == 0 {
            self.soft_pending_compaction_bytes_limit = hard;
        } else if hard > 0 && hard < soft {
            warn!(soft, hard, "lowering soft_pending_compaction_bytes_limit to the hard limit");
            self.soft_pending_compaction_bytes_limit = hard;
        }

        if self.arena_block_size == 0 {
            self.arena_block_size = (self.write_buffer_size / 8).max(MIN_ARENA_BLOCK_SIZE);
        }
        self
    }

    /// Applies `name=value` changes in order. Stops at the first bad one, in which case
    /// `self` may be partially updated; callers work on a copy.
    pub fn apply_changes<K, V>(&mut self, changes: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in changes {
            self.apply_change(name.as_ref(), value.as_ref())?;
        }
        Ok(())
    }

    fn apply_change(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "write_buffer_size" => self.write_buffer_size = parse_size(name, value)?,
            "max_write_buffer_number" => self.max_write_buffer_number = parse_u32(name, value)?,
            "arena_block_size" => self.arena_block_size = parse_size(name, value)?,
            "memtable_prefix_bloom_bits" => {
                self.memtable_prefix_bloom_bits = parse_u32(name, value)?
            }
            "memtable_prefix_bloom_probes" => {
                self.memtable_prefix_bloom_probes = parse_u32(name, value)?
            }
            "memtable_prefix_bloom_huge_page_tlb_size" => {
                self.memtable_prefix_bloom_huge_page_tlb_size = parse_size(name, value)?
            }
            "max_successive_merges" => self.max_successive_merges = parse_size(name, value)?,
            "filter_deletes" => self.filter_deletes = parse_bool(name, value)?,
            "inplace_update_num_locks" => {
                self.inplace_update_num_locks = parse_size(name, value)?
            }
            "level0_file_num_compaction_trigger" => {
                self.level0_file_num_compaction_trigger = parse_u32(name, value)?
            }
            "level0_slowdown_writes_trigger" => {
                self.level0_slowdown_writes_trigger = parse_u32(name, value)?
            }
            "level0_stop_writes_trigger" => {
                self.level0_stop_writes_trigger = parse_u32(name, value)?
            }
            "soft_pending_compaction_bytes_limit" => {
                self.soft_pending_compaction_bytes_limit = parse_size(name, value)?
            }
            "hard_pending_compaction_bytes_limit" => {
                self.hard_pending_compaction_bytes_limit = parse_size(name, value)?
            }
            "disable_auto_compactions" => {
                self.disable_auto_compactions = parse_bool(name, value)?
            }
            "compaction_pri" => self.compaction_pri = value.parse()?,
            "target_file_size_base" => self.target_file_size_base = parse_size(name, value)?,
            "target_file_size_multiplier" => {
                self.target_file_size_multiplier = parse_u32(name, value)?
            }
            "max_bytes_for_level_base" => {
                self.max_bytes_for_level_base = parse_size(name, value)?
            }
            "max_bytes_for_level_multiplier" => {
                self.max_bytes_for_level_multiplier = parse_u32(name, value)?
            }
            "max_bytes_for_level_multiplier_additional" => {
                self.max_bytes_for_level_multiplier_additional = parse_u32_list(name, value)?
            }
            "max_grandparent_overlap_factor" => {
                self.max_grandparent_overlap_factor = parse_u32(name, value)?
            }
            "expanded_compaction_factor" => {
                self.expanded_compaction_factor = parse_u32(name, value)?
            }
            "source_compaction_factor" => self.source_compaction_factor = parse_u32(name, value)?,
            "max_subcompactions" => self.max_subcompactions = parse_u32(name, value)?,
            "verify_checksums_in_compaction" => {
                self.verify_checksums_in_compaction = parse_bool(name, value)?
            }
            "paranoid_file_checks" => self.paranoid_file_checks = parse_bool(name, value)?,
            "compaction_measure_io_stats" => {
                self.compaction_measure_io_stats = parse_bool(name, value)?
            }
            "max_sequential_skip_in_iterations" => {
                self.max_sequential_skip_in_iterations = parse_size(name, value)?
            }
            _ => return Err(ControlError::UnknownOption(name.to_string())),
        }
        Ok(())
    }

    pub(crate) fn dump_lines(&self) -> Vec<String> {
        let additional = self
            .max_bytes_for_level_multiplier_additional
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(":");
        let compaction_file_size = match &self.max_file_size_for_compaction {
            Some(limit) => limit.get().to_string(),
            None => "unbounded".to_string(),
        };
        let fields: [(&str, String); 30] = [
            ("write_buffer_size", self.write_buffer_size.to_string()),
            ("max_write_buffer_number", self.max_write_buffer_number.to_string()),
            ("arena_block_size", self.arena_block_size.to_string()),
            ("memtable_prefix_bloom_bits", self.memtable_prefix_bloom_bits.to_string()),
            ("memtable_prefix_bloom_probes", self.memtable_prefix_bloom_probes.to_string()),
            (
                "memtable_prefix_bloom_huge_page_tlb_size",
                self.memtable_prefix_bloom_huge_page_tlb_size.to_string(),
            ),
            ("max_successive_merges", self.max_successive_merges.to_string()),
            ("filter_deletes", self.filter_deletes.to_string()),
            ("inplace_update_num_locks", self.inplace_update_num_locks.to_string()),
            ("disable_auto_compactions", self.disable_auto_compactions.to_string()),
            (
                "soft_pending_compaction_bytes_limit",
                self.soft_pending_compaction_bytes_limit.to_string(),
            ),
            (
                "hard_pending_compaction_bytes_limit",
                self.hard_pending_compaction_bytes_limit.to_string(),
            ),
            (
                "level0_file_num_compaction_trigger",
                self.level0_file_num_compaction_trigger.to_string(),
            ),
            (
                "level0_slowdown_writes_trigger",
                self.level0_slowdown_writes_trigger.to_string(),
            ),
            ("level0_stop_writes_trigger", self.level0_stop_writes_trigger.to_string()),
            ("compaction_pri", self.compaction_pri.to_string()),
            (
                "max_grandparent_overlap_factor",
                self.max_grandparent_overlap_factor.to_string(),
            ),
            ("expanded_compaction_factor", self.expanded_compaction_factor.to_string()),
            ("source_compaction_factor", self.source_compaction_factor.to_string()),
            ("target_file_size_base", self.target_file_size_base.to_string()),
            ("target_file_size_multiplier", self.target_file_size_multiplier.to_string()),
            ("max_bytes_for_level_base", self.max_bytes_for_level_base.to_string()),
            (
                "max_bytes_for_level_multiplier",
                self.max_bytes_for_level_multiplier.to_string(),
            ),
            ("max_bytes_for_level_multiplier_additional", additional),
            (
                "verify_checksums_in_compaction",
                self.verify_checksums_in_compaction.to_string(),
            ),
            ("max_subcompactions", self.max_subcompactions.to_string()),
            (
                "max_sequential_skip_in_iterations",
                self.max_sequential_skip_in_iterations.to_string(),
            ),
            ("paranoid_file_checks", self.paranoid_file_checks.to_string()),
            ("compaction_measure_io_stats", self.compaction_measure_io_stats.to_string()),
            ("max_file_size_for_compaction", compaction_file_size),
        ];
        fields
            .into_iter()
            .map(|(name, value)| format!("Options.{name}: {value}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use crate::error::ControlError;
    use crate::options::{ColumnFamilyOptions, CompactionPri};
    use crate::policy::CompactionFileSizeLimit;

    #[test]
    fn test_defaults() {
        let options = ColumnFamilyOptions::default();
        assert_eq!(options.write_buffer_size, 64 << 20);
        assert_eq!(options.level0_slowdown_writes_trigger, 20);
        assert_eq!(options.level0_stop_writes_trigger, 24);
        assert_eq!(options.max_subcompactions, 1);
        assert!(options.max_bytes_for_level_multiplier_additional.is_empty());
        assert!(options.max_file_size_for_compaction.is_none());
        options.validate().unwrap();
    }

    #[test]
    fn test_apply_changes() {
        let mut options = ColumnFamilyOptions::default();
        options
            .apply_changes(btreemap! {
                "write_buffer_size" => "32M",
                "max_bytes_for_level_multiplier_additional" => "1:2:3",
                "compaction_pri" => "kOldestLargestSeqFirst",
                "disable_auto_compactions" => "true",
                "max_subcompactions" => "4",
            })
            .unwrap();
        assert_eq!(options.write_buffer_size, 32 << 20);
        assert_eq!(options.max_bytes_for_level_multiplier_additional, vec![1, 2, 3]);
        assert_eq!(options.compaction_pri, CompactionPri::OldestLargestSeqFirst);
        assert!(options.disable_auto_compactions);
        assert_eq!(options.max_subcompactions, 4);
    }

    #[test]
    fn test_memtable_options() {
        let mut options = ColumnFamilyOptions::default();
        assert_eq!(options.memtable_prefix_bloom_probes, 6);
        assert_eq!(options.inplace_update_num_locks, 10000);
        options
            .apply_changes(btreemap! {
                "memtable_prefix_bloom_bits" => "8192",
                "memtable_prefix_bloom_probes" => "4",
                "memtable_prefix_bloom_huge_page_tlb_size" => "2M",
                "max_successive_merges" => "3",
                "filter_deletes" => "1",
                "inplace_update_num_locks" => "64",
            })
            .unwrap();
        assert_eq!(options.memtable_prefix_bloom_bits, 8192);
        assert_eq!(options.memtable_prefix_bloom_probes, 4);
        assert_eq!(options.memtable_prefix_bloom_huge_page_tlb_size, 2 << 20);
        assert_eq!(options.max_successive_merges, 3);
        assert!(options.filter_deletes);
        assert_eq!(options.inplace_update_num_locks, 64);

        let lines = options.dump_lines();
        assert_eq!(lines.len(), 30);
        assert!(lines.contains(&"Options.memtable_prefix_bloom_bits: 8192".to_string()));
        assert!(lines.contains(&"Options.filter_deletes: true".to_string()));
        assert!(lines.contains(&"Options.inplace_update_num_locks: 64".to_string()));
    }

    #[test]
    fn test_apply_unknown_and_invalid() {
        let mut options = ColumnFamilyOptions::default();
        assert_eq!(
            options.apply_changes([("no_such_option", "1")]),
            Err(ControlError::UnknownOption("no_such_option".to_string()))
        );
        assert!(matches!(
            options.apply_changes([("max_write_buffer_number", "many")]),
            Err(ControlError::InvalidOption { .. })
        ));
        assert!(matches!(
            options.apply_changes([("max_write_buffer_number", "8G")]),
            Err(ControlError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let options = ColumnFamilyOptions::builder().max_subcompactions(0).build();
        assert!(matches!(
            options.validate(),
            Err(ControlError::InvalidOption { name, .. }) if name == "max_subcompactions"
        ));

        let options = ColumnFamilyOptions::builder()
            .max_bytes_for_level_multiplier_additional(vec![1, 0])
            .build();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_sanitize_orders_triggers() {
        let options = ColumnFamilyOptions::builder()
            .level0_file_num_compaction_trigger(8)
            .level0_slowdown_writes_trigger(4)
            .level0_stop_writes_trigger(2)
            .soft_pending_compaction_bytes_limit(100)
            .hard_pending_compaction_bytes_limit(50)
            .write_buffer_size(1 << 20)
            .build()
            .sanitize();
        assert_eq!(options.level0_slowdown_writes_trigger, 8);
        assert_eq!(options.level0_stop_writes_trigger, 8);
        assert_eq!(options.soft_pending_compaction_bytes_limit, 50);
        assert_eq!(options.arena_block_size, 128 << 10);
    }

    #[test]
    fn test_sanitize_soft_limit_follows_hard() {
        let options = ColumnFamilyOptions::builder()
            .soft_pending_compaction_bytes_limit(0)
            .hard_pending_compaction_bytes_limit(1 << 30)
            .build()
            .sanitize();
        assert_eq!(options.soft_pending_compaction_bytes_limit, 1 << 30);
    }

    #[test]
    fn test_json_round_trip_skips_size_policy() {
        let options = ColumnFamilyOptions::builder()
            .max_file_size_for_compaction(CompactionFileSizeLimit::new(|| 1024u64))
            .write_buffer_size(1 << 20)
            .build();
        let json = serde_json::to_string(&options).unwrap();
        let parsed: ColumnFamilyOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.write_buffer_size, 1 << 20);
        assert!(parsed.max_file_size_for_compaction.is_none());

        let partial: ColumnFamilyOptions =
            serde_json::from_str(r#"{"max_write_buffer_number": 6}"#).unwrap();
        assert_eq!(partial.max_write_buffer_number, 6);
        assert_eq!(partial.write_buffer_size, 64 << 20);
    }
}
