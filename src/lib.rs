pub mod admission;
pub mod column_family;
pub mod compact;
pub mod env;
pub mod error;
pub mod flush;
pub mod level;
pub mod options;
pub mod policy;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use column_family::ColumnFamily;
pub use error::{ControlError, Result};
pub use options::{ColumnFamilyOptions, ImmutableCfOptions, OptionsSnapshot};
