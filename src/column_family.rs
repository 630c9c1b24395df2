use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::admission::{
    DelayPolicy, ProportionalDelay, StallSource, StallStats, WriteAdmission, WriteController,
};
use crate::compact::{CompactionPicker, CompactionTask, should_trigger_compaction};
use crate::error::Result;
use crate::flush::{FlushController, FlushDecision};
use crate::level::{FileMetadata, KeyRange, LevelMetadata, estimate_pending_compaction_bytes};
use crate::options::{ColumnFamilyOptions, ImmutableCfOptions, OptionsHandle, OptionsSnapshot};

/// The control state of one column family: published options, live level metadata and the
/// write controller gating foreground writes.
pub struct ColumnFamily<D = ProportionalDelay> {
    name: String,
    options: OptionsHandle,
    levels: ArcSwap<LevelMetadata>,
    // serializes read-modify-write of `levels`
    levels_lock: Mutex<()>,
    write_controller: WriteController<D>,
    picker: CompactionPicker,
}

impl ColumnFamily {
    pub fn new(
        name: impl Into<String>,
        options: ColumnFamilyOptions,
        immutable: ImmutableCfOptions,
    ) -> Result<Self> {
        Self::with_parts(
            name,
            options,
            immutable,
            WriteController::default(),
            CompactionPicker::default(),
        )
    }
}

impl<D: DelayPolicy> ColumnFamily<D> {
    pub fn with_parts(
        name: impl Into<String>,
        options: ColumnFamilyOptions,
        immutable: ImmutableCfOptions,
        write_controller: WriteController<D>,
        picker: CompactionPicker,
    ) -> Result<Self> {
        let num_levels = immutable.num_levels;
        Ok(Self {
            name: name.into(),
            options: OptionsHandle::new(options, immutable)?,
            levels: ArcSwap::from_pointee(LevelMetadata::empty(num_levels)),
            levels_lock: Mutex::new(()),
            write_controller,
            picker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> Arc<OptionsSnapshot> {
        self.options.load()
    }

    pub fn level_metadata(&self) -> Arc<LevelMetadata> {
        self.levels.load_full()
    }

    pub fn write_controller(&self) -> &WriteController<D> {
        &self.write_controller
    }

    pub fn stall_stats(&self) -> StallStats {
        self.write_controller.stats()
    }

    /// Waits until a foreground write may go ahead.
    pub async fn admit_write(&self) -> WriteAdmission {
        self.write_controller.admit(self).await
    }

    /// Publishes the level layout left behind by a flush or compaction and wakes stopped
    /// writers. Pending compaction bytes are recomputed against the current options.
    pub fn install_level_metadata(&self, meta: LevelMetadata) -> Arc<LevelMetadata> {
        let _guard = self.levels_lock.lock();
        self.publish_levels(meta)
    }

    /// Adds a freshly flushed file to level 0.
    pub fn add_flushed_file(&self, file: Arc<FileMetadata>) -> Arc<LevelMetadata> {
        let _guard = self.levels_lock.lock();
        let current = self.levels.load();
        let next = current.apply_edit(&Default::default(), 0, [file]);
        self.publish_levels(next)
    }

    fn publish_levels(&self, meta: LevelMetadata) -> Arc<LevelMetadata> {
        let options = self.options.load();
        let pending = estimate_pending_compaction_bytes(&options, &meta);
        let meta = Arc::new(meta.with_pending_compaction_bytes(pending));
        self.levels.store(meta.clone());
        debug!(
            cf = %self.name,
            l0_files = meta.l0_file_count(),
            pending,
            "level metadata installed"
        );
        self.write_controller.signal_progress();
        meta
    }

    /// Applies `"name=value; ..."` changes. Stopped writers re-evaluate against the new limits.
    pub fn set_options(&self, changes: &str) -> Result<Arc<OptionsSnapshot>> {
        let snapshot = self.options.set_options(changes)?;
        self.refresh_after_options_change();
        Ok(snapshot)
    }

    pub fn update_options<F>(&self, change: F) -> Result<Arc<OptionsSnapshot>>
    where
        F: FnOnce(&mut ColumnFamilyOptions) -> Result<()>,
    {
        let snapshot = self.options.update(change)?;
        self.refresh_after_options_change();
        Ok(snapshot)
    }

    fn refresh_after_options_change(&self) {
        let _guard = self.levels_lock.lock();
        let current = LevelMetadata::clone(&self.levels.load());
        self.publish_levels(current);
    }

    pub fn should_flush(&self, active_memtable_size: u64) -> bool {
        FlushController::new(self.options().options()).should_flush(active_memtable_size)
    }

    pub fn admit_new_memtable(&self, unflushed_memtables: usize) -> bool {
        FlushController::new(self.options().options()).admit_new_memtable(unflushed_memtables)
    }

    pub fn check_flush(
        &self,
        active_memtable_size: u64,
        unflushed_memtables: usize,
    ) -> FlushDecision {
        FlushController::new(self.options().options())
            .check(active_memtable_size, unflushed_memtables)
    }

    pub fn should_trigger_compaction(&self) -> bool {
        should_trigger_compaction(&self.options(), &self.level_metadata())
    }

    /// Picks a compaction without claiming its files.
    pub fn pick_compaction(&self) -> Result<Option<CompactionTask>> {
        self.picker
            .pick_compaction(&self.options(), &self.level_metadata())
    }

    pub fn pick_range_compaction(
        &self,
        level: usize,
        range: &KeyRange,
    ) -> Result<Option<CompactionTask>> {
        self.picker
            .pick_range_compaction(&self.options(), &self.level_metadata(), level, range)
    }

    /// Picks a compaction and marks its files as being compacted in one step, so concurrent
    /// pickers never hand out the same file twice.
    pub fn claim_compaction(&self) -> Result<Option<CompactionTask>> {
        let _guard = self.levels_lock.lock();
        let current = self.levels.load_full();
        let task = self.picker.pick_compaction(&self.options(), &current)?;
        if let Some(task) = &task {
            self.levels
                .store(Arc::new(current.mark_being_compacted(&task.file_ids(), true)));
        }
        Ok(task)
    }

    /// Like [`Self::claim_compaction`] for a manual range compaction.
    pub fn claim_range_compaction(
        &self,
        level: usize,
        range: &KeyRange,
    ) -> Result<Option<CompactionTask>> {
        let _guard = self.levels_lock.lock();
        let current = self.levels.load_full();
        let task = self
            .picker
            .pick_range_compaction(&self.options(), &current, level, range)?;
        if let Some(task) = &task {
            self.levels
                .store(Arc::new(current.mark_being_compacted(&task.file_ids(), true)));
        }
        Ok(task)
    }

    /// Replaces the task's files with `outputs` in the output level.
    pub fn apply_compaction(
        &self,
        task: &CompactionTask,
        outputs: impl IntoIterator<Item = Arc<FileMetadata>>,
    ) -> Arc<LevelMetadata> {
        let _guard = self.levels_lock.lock();
        let current = self.levels.load();
        let next = current.apply_edit(&task.file_ids(), task.output_level(), outputs);
        self.publish_levels(next)
    }

    /// Hands the task's files back after a failed compaction.
    pub fn release_compaction(&self, task: &CompactionTask) {
        let _guard = self.levels_lock.lock();
        let current = self.levels.load();
        let next = current.mark_being_compacted(&task.file_ids(), false);
        self.levels.store(Arc::new(next));
    }

    pub fn dump_lines(&self) -> Vec<String> {
        let options = self.options();
        let meta = self.level_metadata();
        let mut lines = vec![format!("Column family: {}", self.name)];
        lines.extend(options.dump_lines());
        for level in 0..meta.num_levels() {
            lines.push(format!(
                "Level[{level}]: files={} bytes={}",
                meta.files(level).len(),
                meta.level_bytes(level)
            ));
        }
        lines.push(format!(
            "Pending compaction bytes: {}",
            meta.pending_compaction_bytes()
        ));
        let stats = self.stall_stats();
        lines.push(format!(
            "Write stalls: stopped={} delayed={} total_delay={:?}",
            stats.stopped_writes, stats.delayed_writes, stats.total_delay
        ));
        lines
    }

    pub fn dump(&self) {
        for line in self.dump_lines() {
            info!(target: "lsm_control::options", cf = %self.name, "{line}");
        }
    }
}

impl<D: DelayPolicy> StallSource for ColumnFamily<D> {
    fn options(&self) -> Arc<OptionsSnapshot> {
        self.options.load()
    }

    fn level_metadata(&self) -> Arc<LevelMetadata> {
        self.levels.load_full()
    }
}
