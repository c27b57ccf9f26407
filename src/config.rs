//! Configuration for snapshot loading and refresh.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use snafu::OptionExt;

use crate::error::{ConfigError, InvalidOptionValueSnafu};

/// Option key controlling the maximum number of checkpoint-fallback retries
/// attempted while materializing a snapshot.
pub const MAX_LOADING_RETRIES_KEY: &str = "snapshot.loading.maxRetries";

/// Option key controlling the staleness limit (milliseconds) for asynchronous
/// refreshes. A limit of zero forces every update onto the synchronous path.
pub const STALENESS_LIMIT_KEY: &str = "async.update.stalenessTimeLimit";

fn default_max_loading_retries() -> usize {
    2
}

fn default_staleness_limit_ms() -> u64 {
    0
}

/// Tuning knobs for the snapshot cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Maximum checkpoint-fallback retries when a checkpoint turns out to be
    /// unreadable during snapshot construction.
    #[serde(default = "default_max_loading_retries")]
    pub max_loading_retries: usize,
    /// How stale (in milliseconds) the cached snapshot may be before
    /// `update(staleness_acceptable = true)` refreshes synchronously instead
    /// of in the background. Zero disables background refreshes entirely.
    #[serde(default = "default_staleness_limit_ms")]
    pub staleness_limit_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_loading_retries: default_max_loading_retries(),
            staleness_limit_ms: default_staleness_limit_ms(),
        }
    }
}

impl SnapshotConfig {
    /// Build a config from a string option map, as passed through table-level
    /// `storage_options`-style plumbing. Unrecognized keys are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = options.get(MAX_LOADING_RETRIES_KEY) {
            config.max_loading_retries = value.parse().ok().context(InvalidOptionValueSnafu {
                key: MAX_LOADING_RETRIES_KEY,
                value: value.as_str(),
            })?;
        }

        if let Some(value) = options.get(STALENESS_LIMIT_KEY) {
            config.staleness_limit_ms = value.parse().ok().context(InvalidOptionValueSnafu {
                key: STALENESS_LIMIT_KEY,
                value: value.as_str(),
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SnapshotConfig::default();
        assert_eq!(config.max_loading_retries, 2);
        assert_eq!(config.staleness_limit_ms, 0);
    }

    #[test]
    fn from_options_recognized_keys() {
        let mut options = HashMap::new();
        options.insert(MAX_LOADING_RETRIES_KEY.to_string(), "5".to_string());
        options.insert(STALENESS_LIMIT_KEY.to_string(), "30000".to_string());
        options.insert("some.other.key".to_string(), "ignored".to_string());

        let config = SnapshotConfig::from_options(&options).unwrap();
        assert_eq!(config.max_loading_retries, 5);
        assert_eq!(config.staleness_limit_ms, 30_000);
    }

    #[test]
    fn from_options_rejects_bad_values() {
        let mut options = HashMap::new();
        options.insert(STALENESS_LIMIT_KEY.to_string(), "soon".to_string());

        let err = SnapshotConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains(STALENESS_LIMIT_KEY));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SnapshotConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_loading_retries, 2);
        assert_eq!(config.staleness_limit_ms, 0);
    }
}
