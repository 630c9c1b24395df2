mod estimate;
mod file;
mod metadata;

pub use estimate::estimate_pending_compaction_bytes;
pub use file::{FileMetadata, KeyRange};
pub use metadata::LevelMetadata;
