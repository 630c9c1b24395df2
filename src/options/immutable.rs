use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{ControlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionStyle {
    #[default]
    Level,
    /// Level 0 holds whole sorted runs, so its files are never size-capped.
    Universal,
}

/// Options fixed when the column family is created. Changing them needs a reopen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ImmutableCfOptions {
    #[builder(default = 7)]
    pub num_levels: usize,
    #[builder(default)]
    pub compaction_style: CompactionStyle,
}

impl Default for ImmutableCfOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ImmutableCfOptions {
    pub fn validate(&self) -> Result<()> {
        if self.num_levels < 2 {
            return Err(ControlError::invalid_option(
                "num_levels",
                format!("{} is less than 2", self.num_levels),
            ));
        }
        Ok(())
    }
}
