//! Sync configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the core can start with zero
//! configuration for local development.

use std::path::PathBuf;

use kindred_shared::constants::{DEFAULT_FEED_CAPACITY, MAX_MESSAGE_CHARS};

/// Sync configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Path of the SQLite message store.
    /// Env: `KINDRED_DB_PATH`
    /// Default: `None` (platform data directory).
    pub db_path: Option<PathBuf>,

    /// Buffer size of the change feed before slow subscribers lag.
    /// Env: `KINDRED_FEED_CAPACITY`
    /// Default: `256`
    pub feed_capacity: usize,

    /// Character limit applied by the compose surface.
    /// Env: `KINDRED_MAX_MESSAGE_CHARS`
    /// Default: `500`
    pub max_message_chars: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            max_message_chars: MAX_MESSAGE_CHARS,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("KINDRED_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("KINDRED_FEED_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.feed_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid KINDRED_FEED_CAPACITY, using default"),
            }
        }

        if let Some(val) = lookup("KINDRED_MAX_MESSAGE_CHARS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_message_chars = n,
                _ => tracing::warn!(value = %val, "Invalid KINDRED_MAX_MESSAGE_CHARS, using default"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.db_path, None);
        assert_eq!(config.feed_capacity, 256);
        assert_eq!(config.max_message_chars, 500);
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("KINDRED_DB_PATH", "/tmp/k.db"),
            ("KINDRED_FEED_CAPACITY", "32"),
        ]));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/k.db")));
        assert_eq!(config.feed_capacity, 32);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("KINDRED_FEED_CAPACITY", "zero"),
            ("KINDRED_MAX_MESSAGE_CHARS", "0"),
        ]));
        assert_eq!(config, SyncConfig::default());
    }
}
