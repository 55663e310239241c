use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Flush/sync strategy applied when a transaction commits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every commit (safest, highest latency).
    EveryCommit,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for opening a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Sync strategy on commit.
    pub sync: SyncMode,
    /// Refuse to start write transactions.
    pub read_only: bool,
}

impl StoreConfig {
    /// A configuration that only permits reads.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.sync, SyncMode::OsDefault);
        assert!(!c.read_only);
    }

    #[test]
    fn parse_toml() {
        let c = StoreConfig::from_toml_str("sync = \"every-commit\"\nread_only = true\n").unwrap();
        assert_eq!(c.sync, SyncMode::EveryCommit);
        assert!(c.read_only);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StoreConfig::from_toml_str("").unwrap(), StoreConfig::default());
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = StoreConfig::from_toml_str("sync = 42").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
