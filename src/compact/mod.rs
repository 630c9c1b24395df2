mod picker;
mod priority;
mod task;
mod trigger;
mod verify;

pub use picker::CompactionPicker;
pub use priority::{FilePriority, priority_for};
pub use task::{CompactionTask, GrandparentOverlapTracker, SubcompactionRange};
pub use trigger::{LevelScore, compaction_scores, should_trigger_compaction};
pub use verify::{CompactionOutput, output_checksum, verify_output_file};
