use std::sync::Arc;

use crate::level::FileMetadata;
use crate::options::{ColumnFamilyOptions, ImmutableCfOptions, OptionsSnapshot};

pub fn file(id: u64, smallest: &str, largest: &str, size: u64) -> Arc<FileMetadata> {
    let file = FileMetadata::builder()
        .id(id)
        .size(size)
        .smallest(smallest.to_string())
        .largest(largest.to_string())
        .build();
    Arc::new(file)
}

/// Default options on 7 levels, adjusted by `change`.
pub fn snapshot_with(change: impl FnOnce(&mut ColumnFamilyOptions)) -> Arc<OptionsSnapshot> {
    let mut options = ColumnFamilyOptions::default();
    change(&mut options);
    Arc::new(OptionsSnapshot::build(options, ImmutableCfOptions::default(), 1).unwrap())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
