use derive_new::new;
use serde::Serialize;
use tracing::debug;

use crate::options::ColumnFamilyOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushDecision {
    /// The active memtable still has room.
    Keep,
    /// Seal the active memtable, schedule its flush and start a new one.
    Rotate,
    /// The memtable is full but too many are already waiting for flush. Writes should wait.
    RotateBlocked,
}

/// Memtable rotation decisions for one options snapshot.
#[derive(Debug, Clone, Copy, new)]
pub struct FlushController<'a> {
    options: &'a ColumnFamilyOptions,
}

impl FlushController<'_> {
    pub fn should_flush(&self, active_memtable_size: u64) -> bool {
        active_memtable_size >= self.options.write_buffer_size
    }

    /// `unflushed_memtables` counts the active memtable and every sealed one not yet flushed.
    pub fn admit_new_memtable(&self, unflushed_memtables: usize) -> bool {
        unflushed_memtables < self.options.max_write_buffer_number as usize
    }

    pub fn check(&self, active_memtable_size: u64, unflushed_memtables: usize) -> FlushDecision {
        if !self.should_flush(active_memtable_size) {
            FlushDecision::Keep
        } else if self.admit_new_memtable(unflushed_memtables) {
            FlushDecision::Rotate
        } else {
            debug!(
                active_memtable_size,
                unflushed_memtables,
                max_write_buffer_number = self.options.max_write_buffer_number,
                "memtable full, waiting for flush"
            );
            FlushDecision::RotateBlocked
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::flush::{FlushController, FlushDecision};
    use crate::options::ColumnFamilyOptions;

    #[test]
    fn test_should_flush() {
        let options = ColumnFamilyOptions::builder().write_buffer_size(64 << 20).build();
        let controller = FlushController::new(&options);
        assert!(!controller.should_flush(0));
        assert!(!controller.should_flush(63 << 20));
        assert!(controller.should_flush(64 << 20));
        assert!(controller.should_flush(65 << 20));
    }

    #[test]
    fn test_admit_new_memtable() {
        let options = ColumnFamilyOptions::builder().max_write_buffer_number(3).build();
        let controller = FlushController::new(&options);
        assert!(controller.admit_new_memtable(1));
        assert!(controller.admit_new_memtable(2));
        assert!(!controller.admit_new_memtable(3));
        assert!(!controller.admit_new_memtable(4));
    }

    #[test]
    fn test_check() {
        let options = ColumnFamilyOptions::builder()
            .write_buffer_size(1 << 20)
            .max_write_buffer_number(2)
            .build();
        let controller = FlushController::new(&options);
        assert_eq!(controller.check(1 << 10, 1), FlushDecision::Keep);
        assert_eq!(controller.check(1 << 20, 1), FlushDecision::Rotate);
        assert_eq!(controller.check(1 << 20, 2), FlushDecision::RotateBlocked);
        assert_eq!(controller.check(0, 2), FlushDecision::Keep);
    }
}
