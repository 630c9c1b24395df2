use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Decides, at the moment a compaction is planned, how large its input and output files
/// may be.
pub trait CompactionFileSizePolicy: Send + Sync + 'static {
    fn max_file_size_for_compaction(&self) -> u64;
}

impl<F> CompactionFileSizePolicy for F
where
    F: Fn() -> u64 + Send + Sync + 'static,
{
    fn max_file_size_for_compaction(&self) -> u64 {
        self()
    }
}

/// Shareable handle to a [`CompactionFileSizePolicy`]. Two handles are equal only when they
/// point at the same policy object.
#[derive(Clone)]
pub struct CompactionFileSizeLimit(Arc<dyn CompactionFileSizePolicy>);

impl CompactionFileSizeLimit {
    pub fn new(policy: impl CompactionFileSizePolicy) -> Self {
        Self(Arc::new(policy))
    }

    pub fn get(&self) -> u64 {
        self.0.max_file_size_for_compaction()
    }
}

impl Debug for CompactionFileSizeLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompactionFileSizeLimit")
            .field(&self.get())
            .finish()
    }
}

impl PartialEq for CompactionFileSizeLimit {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
