//! Monitor configuration.
//!
//! [`MonitorConfig`] carries the timing and behavior knobs of a session.
//! Defaults are usable as-is; a TOML file and the environment can override
//! them:
//!
//! ```toml
//! # ~/.config/busmon/config.toml
//! dispatch_interval_ms = 250
//! query_timeout_ms = 15000
//! stop_grace_ms = 1000
//! low_priority = true
//! resolve_executables = true
//! verbose_startup = false
//! ```
//!
//! Setting `BUSMON_DEBUG` to any non-empty value turns on `verbose_startup`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that enables the verbose startup dump.
pub const DEBUG_ENV_VAR: &str = "BUSMON_DEBUG";

/// Bounded wait of one dispatch iteration.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(250);

/// Timeout of blocking directory queries.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// How long a stop request waits for the dispatch thread.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("failed to parse config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ============================================================================
// Monitor Config
// ============================================================================

/// Configuration of a monitor session.
///
/// # Example
///
/// ```rust
/// use busmon_engine::config::MonitorConfig;
/// use std::time::Duration;
///
/// let config = MonitorConfig {
///     dispatch_interval: Duration::from_millis(100),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Bounded wait of one dispatch iteration; cancellation is noticed
    /// within one interval.
    pub dispatch_interval: Duration,

    /// Timeout of blocking bus queries (names, owners, pids).
    pub query_timeout: Duration,

    /// How long `request_stop` waits for the dispatch thread to exit.
    pub stop_grace: Duration,

    /// Run the dispatch thread at reduced scheduling priority.
    pub low_priority: bool,

    /// Resolve executable paths of peers.
    pub resolve_executables: bool,

    /// Report every enumerated name, owner and pid at startup.
    pub verbose_startup: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
            low_priority: true,
            resolve_executables: true,
            verbose_startup: false,
        }
    }
}

/// On-disk form; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    dispatch_interval_ms: Option<u64>,
    query_timeout_ms: Option<u64>,
    stop_grace_ms: Option<u64>,
    low_priority: Option<bool>,
    resolve_executables: Option<bool>,
    verbose_startup: Option<bool>,
}

impl MonitorConfig {
    /// Default location: `$XDG_CONFIG_HOME/busmon/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("busmon").join("config.toml"))
    }

    /// Loads `path` on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|err| match err {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses TOML text on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        let mut config = Self::default();
        config.apply(file)?;
        Ok(config)
    }

    /// Applies environment overrides.
    pub fn with_env(mut self) -> Self {
        if env::var_os(DEBUG_ENV_VAR).is_some_and(|v| !v.is_empty()) {
            self.verbose_startup = true;
        }
        self
    }

    fn apply(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(ms) = file.dispatch_interval_ms {
            self.dispatch_interval = positive_millis("dispatch_interval_ms", ms)?;
        }
        if let Some(ms) = file.query_timeout_ms {
            self.query_timeout = positive_millis("query_timeout_ms", ms)?;
        }
        if let Some(ms) = file.stop_grace_ms {
            self.stop_grace = Duration::from_millis(ms);
        }
        if let Some(v) = file.low_priority {
            self.low_priority = v;
        }
        if let Some(v) = file.resolve_executables {
            self.resolve_executables = v;
        }
        if let Some(v) = file.verbose_startup {
            self.verbose_startup = v;
        }
        Ok(())
    }
}

fn positive_millis(field: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.dispatch_interval, Duration::from_millis(250));
        assert_eq!(config.query_timeout, Duration::from_secs(15));
        assert_eq!(config.stop_grace, Duration::from_secs(1));
        assert!(config.low_priority);
        assert!(config.resolve_executables);
        assert!(!config.verbose_startup);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config =
            MonitorConfig::from_toml_str("dispatch_interval_ms = 100\nlow_priority = false\n")
                .expect("valid config");
        assert_eq!(config.dispatch_interval, Duration::from_millis(100));
        assert!(!config.low_priority);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = MonitorConfig::from_toml_str("dispatch_interval_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "dispatch_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = MonitorConfig::from_toml_str("colour = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "query_timeout_ms = 2000").expect("write");
        writeln!(file, "verbose_startup = true").expect("write");

        let config = MonitorConfig::load(file.path()).expect("load");
        assert_eq!(config.query_timeout, Duration::from_secs(2));
        assert!(config.verbose_startup);
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "query_timeout_ms = \"soon\"").expect("write");

        let err = MonitorConfig::load(file.path()).unwrap_err();
        let ConfigError::Parse { path, .. } = &err else {
            panic!("expected parse error, got {err:?}");
        };
        assert_eq!(path.as_path(), file.path());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = MonitorConfig::load_or_default(&dir.path().join("absent.toml"))
            .expect("defaults");
        assert_eq!(config, MonitorConfig::default());

        let err = MonitorConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
