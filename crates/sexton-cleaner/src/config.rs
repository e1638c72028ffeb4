//! Configuration for Cleaner operations
//!
//! Covers the worker thread's name, stack size and poll timeout. Settings can
//! be built in code or loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Smallest stack size accepted for the worker thread
const MIN_STACK_SIZE: usize = 16 * 1024;

/// Cleaner configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A field holds a value the cleaner cannot run with
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Configuration for a [`Cleaner`](crate::Cleaner)
///
/// # Examples
///
/// ```
/// use sexton_cleaner::CleanerConfig;
/// use std::time::Duration;
///
/// let config = CleanerConfig::default();
/// assert_eq!(config.poll_timeout(), Duration::from_secs(60));
///
/// let config = CleanerConfig::responsive();
/// assert_eq!(config.poll_timeout(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Name given to the worker thread
    /// Default: "sexton-cleaner"
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Upper bound on how long the worker blocks waiting for a reclaimed
    /// registration before re-checking whether it still has work (milliseconds)
    /// Default: 60000
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Worker thread stack size in bytes; platform default when unset
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_thread_name() -> String {
    "sexton-cleaner".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    60_000
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            poll_timeout_ms: default_poll_timeout_ms(),
            stack_size: None,
        }
    }
}

impl CleanerConfig {
    /// Short poll timeout so an idle worker notices shutdown quickly
    ///
    /// Suitable for tests and short-lived processes.
    pub fn responsive() -> Self {
        Self {
            poll_timeout_ms: 100,
            ..Self::default()
        }
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: CleanerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file and validate it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check that every field holds a usable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.thread_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "thread_name",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(size) = self.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(ConfigError::Invalid {
                    field: "stack_size",
                    reason: format!("{} bytes is below the {} byte minimum", size, MIN_STACK_SIZE),
                });
            }
        }
        Ok(())
    }

    /// Get the poll timeout as Duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CleanerConfig::default();
        assert_eq!(config.thread_name, "sexton-cleaner");
        assert_eq!(config.poll_timeout_ms, 60_000);
        assert_eq!(config.stack_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_responsive_config() {
        let config = CleanerConfig::responsive();
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));
        assert!(config.poll_timeout() < CleanerConfig::default().poll_timeout());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            thread_name = "resource-reaper"
            poll_timeout_ms = 250
            stack_size = 262144
        "#;

        let config = CleanerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.thread_name, "resource-reaper");
        assert_eq!(config.poll_timeout(), Duration::from_millis(250));
        assert_eq!(config.stack_size, Some(262_144));
    }

    #[test]
    fn test_parse_toml_uses_defaults() {
        let config = CleanerConfig::from_toml_str("").unwrap();
        assert_eq!(config, CleanerConfig::default());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = CleanerConfig::from_toml_str("poll_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "poll_timeout_ms", .. }));
    }

    #[test]
    fn test_rejects_blank_thread_name() {
        let config = CleanerConfig {
            thread_name: "   ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "thread_name", .. })
        ));
    }

    #[test]
    fn test_rejects_tiny_stack() {
        let config = CleanerConfig {
            stack_size: Some(1024),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stack_size"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = CleanerConfig::from_toml_str("poll_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "thread_name = \"file-cleaner\"").unwrap();
        writeln!(file, "poll_timeout_ms = 5000").unwrap();

        let config = CleanerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.thread_name, "file-cleaner");
        assert_eq!(config.poll_timeout_ms, 5000);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CleanerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = CleanerConfig {
            thread_name: "roundtrip".to_string(),
            poll_timeout_ms: 42,
            stack_size: Some(MIN_STACK_SIZE),
        };
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: CleanerConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }
}
