//! Container construction options.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default bound on commit/notify rounds within one flush.
pub const DEFAULT_MAX_SETTLE_ROUNDS: usize = 64;

/// Options fixed when a container is created.
///
/// Deserializable with every field optional, so a config file only names
/// what it changes:
///
/// ```
/// let options: dendriform::Options = serde_json::from_str(r#"{"history": 50}"#).unwrap();
/// assert_eq!(options.history, 50);
/// assert!(!options.replace);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Maximum number of history entries kept. `0` disables history.
    pub history: usize,
    /// Commits overwrite the latest history entry unless told otherwise.
    pub replace: bool,
    /// How many commit/notify rounds a flush may take before it gives up
    /// with [`Error::SettleLimit`](crate::Error::SettleLimit).
    pub max_settle_rounds: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            history: 0,
            replace: false,
            max_settle_rounds: DEFAULT_MAX_SETTLE_ROUNDS,
        }
    }
}

impl Options {
    pub fn history(mut self, capacity: usize) -> Self {
        self.history = capacity;
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn max_settle_rounds(mut self, rounds: usize) -> Self {
        self.max_settle_rounds = rounds;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_settle_rounds == 0 {
            return Err(ConfigError::InvalidOption {
                name: "max_settle_rounds",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
