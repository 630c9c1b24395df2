use thiserror::Error;

use crate::env::EnvError;

pub type Result<T, E = ControlError> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// A derived size does not fit in `u64`. The options change that produced it is rejected.
    #[error("`{what}` overflows: {value} * {multiplier}")]
    ConfigOverflow {
        what: &'static str,
        value: u64,
        multiplier: u64,
    },

    #[error("level {level} is out of range, column family has {num_levels} levels")]
    InvalidLevel { level: usize, num_levels: usize },

    /// Auto compaction is switched off. Not a failure, callers treat it as "nothing to do".
    #[error("auto compactions are disabled")]
    Disabled,

    #[error("corruption: {0}")]
    Corruption(String),

    #[error("invalid value for option `{name}`: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("unknown option `{0}`")]
    UnknownOption(String),

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl ControlError {
    pub fn is_disabled(&self) -> bool {
        matches!(self, ControlError::Disabled)
    }

    pub(crate) fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ControlError::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
