mod cf_options;
mod compaction_pri;
mod immutable;
mod parse;
mod snapshot;

pub use cf_options::ColumnFamilyOptions;
pub use compaction_pri::CompactionPri;
pub use immutable::{CompactionStyle, ImmutableCfOptions};
pub use parse::parse_options_str;
pub use snapshot::{OptionsHandle, OptionsSnapshot};
