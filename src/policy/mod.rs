mod derived;
mod sizing;

pub use derived::{DerivedLimits, multiply_check_overflow, refresh_derived};
pub use sizing::{CompactionFileSizeLimit, CompactionFileSizePolicy};
