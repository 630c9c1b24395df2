use std::sync::Arc;

use arc_swap::ArcSwap;
use derive_getters::Getters;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ControlError, Result};
use crate::options::{ColumnFamilyOptions, ImmutableCfOptions, parse_options_str};
use crate::policy::{DerivedLimits, refresh_derived};

/// A published, never mutated configuration: the options plus everything derived from them.
#[derive(Debug, Clone, Serialize, Getters)]
pub struct OptionsSnapshot {
    #[getter(skip)]
    version: u64,
    options: ColumnFamilyOptions,
    immutable: ImmutableCfOptions,
    derived: DerivedLimits,
}

impl OptionsSnapshot {
    pub fn build(
        options: ColumnFamilyOptions,
        immutable: ImmutableCfOptions,
        version: u64,
    ) -> Result<Self> {
        immutable.validate()?;
        let options = options.sanitize();
        options.validate()?;
        let derived = refresh_derived(&options, &immutable)?;
        Ok(Self {
            version,
            options,
            immutable,
            derived,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn num_levels(&self) -> usize {
        self.immutable.num_levels
    }

    fn per_level(&self, values: &[u64], level: usize) -> Result<u64> {
        values
            .get(level)
            .copied()
            .ok_or(ControlError::InvalidLevel {
                level,
                num_levels: self.num_levels(),
            })
    }

    pub fn max_file_size_for_level(&self, level: usize) -> Result<u64> {
        self.per_level(self.derived.max_file_size(), level)
    }

    pub fn max_grandparent_overlap_bytes(&self, level: usize) -> Result<u64> {
        self.per_level(self.derived.max_grandparent_overlap_bytes(), level)
    }

    pub fn expanded_compaction_byte_size_limit(&self, level: usize) -> Result<u64> {
        self.per_level(self.derived.expanded_compaction_byte_size_limit(), level)
    }

    pub fn source_compaction_byte_size_limit(&self, level: usize) -> Result<u64> {
        self.per_level(self.derived.source_compaction_byte_size_limit(), level)
    }

    pub fn max_bytes_for_level(&self, level: usize) -> Result<u64> {
        self.per_level(self.derived.max_bytes_for_level(), level)
    }

    /// The `index`-th additional level multiplier, 1 past the configured ones.
    pub fn max_bytes_multiplier_additional(&self, index: usize) -> u32 {
        self.options
            .max_bytes_for_level_multiplier_additional
            .get(index)
            .copied()
            .unwrap_or(1)
    }

    pub fn max_file_size_for_compaction(&self) -> u64 {
        self.options
            .max_file_size_for_compaction
            .as_ref()
            .map_or(u64::MAX, |limit| limit.get())
    }

    pub fn dump_lines(&self) -> Vec<String> {
        let mut lines = self.options.dump_lines();
        lines.push(format!("Options.num_levels: {}", self.immutable.num_levels));
        lines.push(format!(
            "Options.compaction_style: {:?}",
            self.immutable.compaction_style
        ));
        for level in 0..self.num_levels() {
            lines.push(format!(
                "Options.level[{level}]: max_file_size={} max_bytes={} grandparent_overlap={} \
                 expanded_compaction={} source_compaction={}",
                self.derived.max_file_size()[level],
                self.derived.max_bytes_for_level()[level],
                self.derived.max_grandparent_overlap_bytes()[level],
                self.derived.expanded_compaction_byte_size_limit()[level],
                self.derived.source_compaction_byte_size_limit()[level],
            ));
        }
        lines
    }

    pub fn dump(&self) {
        info!(target: "lsm_control::options", version = self.version, "options snapshot");
        for line in self.dump_lines() {
            info!(target: "lsm_control::options", "{line}");
        }
    }
}

/// The currently published [`OptionsSnapshot`] of a column family.
///
/// Readers take an `Arc` and keep it for as long as their job runs. Writers are serialized
/// and publish a whole new snapshot, so a reader never sees a half-applied change.
pub struct OptionsHandle {
    current: ArcSwap<OptionsSnapshot>,
    update_lock: Mutex<()>,
}

impl OptionsHandle {
    pub fn new(options: ColumnFamilyOptions, immutable: ImmutableCfOptions) -> Result<Self> {
        let snapshot = OptionsSnapshot::build(options, immutable, 1)?;
        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            update_lock: Mutex::new(()),
        })
    }

    pub fn load(&self) -> Arc<OptionsSnapshot> {
        self.current.load_full()
    }

    /// Applies `change` to a copy of the current options and publishes the result. On any
    /// error the current snapshot stays in place.
    pub fn update<F>(&self, change: F) -> Result<Arc<OptionsSnapshot>>
    where
        F: FnOnce(&mut ColumnFamilyOptions) -> Result<()>,
    {
        let _guard = self.update_lock.lock();
        let current = self.current.load_full();
        let mut options = current.options.clone();
        change(&mut options)?;
        let next = OptionsSnapshot::build(options, current.immutable.clone(), current.version + 1)
            .inspect_err(|e| warn!(error = %e, version = current.version, "options change rejected"))?;
        let next = Arc::new(next);
        self.current.store(next.clone());
        info!(version = next.version, "options published");
        Ok(next)
    }

    /// `"write_buffer_size=32M; max_write_buffer_number=4"`.
    pub fn set_options(&self, changes: &str) -> Result<Arc<OptionsSnapshot>> {
        let changes = parse_options_str(changes)?;
        self.update(|options| options.apply_changes(changes))
    }

    pub fn replace(&self, options: ColumnFamilyOptions) -> Result<Arc<OptionsSnapshot>> {
        self.update(|current| {
            *current = options;
            Ok(())
        })
    }
}
