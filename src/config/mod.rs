//! Configuration management.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, `FACTGRAPH_CONFIG_PATH`, or the platform
//!    config dir)
//! 3. `FACTGRAPH_*` environment variables
//!
//! ```toml
//! db_path = "/var/lib/factgraph/graph.db"
//!
//! [storage]
//! busy_timeout_ms = 5000
//! max_retries = 3
//!
//! [temporal]
//! conflict_policy = "supersede"
//!
//! [maintenance]
//! orphan_exclude_labels = ["Pattern", "Regime"]
//!
//! [logging]
//! format = "json"
//! ```

use crate::models::{ConflictPolicy, Label, parse_label_list};
use crate::observability::LogFormat;
use crate::storage::RetryPolicy;
use crate::storage::sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "FACTGRAPH_CONFIG_PATH";

/// Main configuration for factgraph.
#[derive(Debug, Clone)]
pub struct FactgraphConfig {
    /// Path to the `SQLite` database file.
    pub db_path: PathBuf,
    /// Transaction timeouts and retry budget.
    pub storage: StorageConfig,
    /// Temporal edge settings.
    pub temporal: TemporalConfig,
    /// Maintenance pass settings.
    pub maintenance: MaintenanceConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Storage timeouts and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Bound on waiting for the in-process connection lock.
    pub lock_timeout_ms: u64,
    /// Retries after the first attempt on a busy database.
    pub max_retries: u32,
    /// Base sleep between retries in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            lock_timeout_ms: 5000,
            max_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl StorageConfig {
    /// Returns the retry policy for these settings.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff_ms)
    }
}

/// Temporal edge settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemporalConfig {
    /// What to do when a new interval overlaps a stored version.
    pub conflict_policy: ConflictPolicy,
}

/// Maintenance pass settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceConfig {
    /// Labels never removed by orphan pruning.
    pub orphan_exclude_labels: Vec<Label>,
    /// Orphans deleted per transaction.
    pub orphan_batch_size: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            orphan_exclude_labels: Label::default_orphan_exclusions().to_vec(),
            orphan_batch_size: 500,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive, e.g. `factgraph=debug`.
    pub filter: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Database path.
    pub db_path: Option<String>,
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Temporal section.
    pub temporal: Option<ConfigFileTemporal>,
    /// Maintenance section.
    pub maintenance: Option<ConfigFileMaintenance>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Busy timeout.
    pub busy_timeout_ms: Option<u64>,
    /// Lock timeout.
    pub lock_timeout_ms: Option<u64>,
    /// Max retries.
    pub max_retries: Option<u32>,
    /// Retry backoff.
    pub retry_backoff_ms: Option<u64>,
}

/// Temporal section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTemporal {
    /// Conflict policy name.
    pub conflict_policy: Option<String>,
}

/// Maintenance section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMaintenance {
    /// Excluded label names.
    pub orphan_exclude_labels: Option<Vec<String>>,
    /// Orphan batch size.
    pub orphan_batch_size: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Format name.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl Default for FactgraphConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage: StorageConfig::default(),
            temporal: TemporalConfig::default(),
            maintenance: MaintenanceConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl FactgraphConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration for the CLI.
    ///
    /// Uses `explicit` if given, else the file named by
    /// `FACTGRAPH_CONFIG_PATH`, else the default location. Environment
    /// overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed,
    /// or if an override has an invalid value.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        config.with_env_overrides()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Returns default configuration if no config file is found. A file that
    /// exists but fails to parse is logged and skipped.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs.config_dir().join("factgraph").join("config.toml");
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            },
        }
    }

    /// Converts a `ConfigFile` to `FactgraphConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(db_path) = file.db_path {
            config.db_path = PathBuf::from(db_path);
        }
        if let Some(storage) = file.storage {
            if let Some(v) = storage.busy_timeout_ms {
                config.storage.busy_timeout_ms = v;
            }
            if let Some(v) = storage.lock_timeout_ms {
                config.storage.lock_timeout_ms = v;
            }
            if let Some(v) = storage.max_retries {
                config.storage.max_retries = v;
            }
            if let Some(v) = storage.retry_backoff_ms {
                config.storage.retry_backoff_ms = v;
            }
        }
        if let Some(policy) = file.temporal.and_then(|t| t.conflict_policy) {
            config.temporal.conflict_policy = policy.parse()?;
        }
        if let Some(maintenance) = file.maintenance {
            if let Some(labels) = maintenance.orphan_exclude_labels {
                config.maintenance.orphan_exclude_labels = labels
                    .iter()
                    .map(|l| l.parse())
                    .collect::<Result<Vec<Label>>>()?;
            }
            if let Some(v) = maintenance.orphan_batch_size {
                config.maintenance.orphan_batch_size = v.max(1);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = format.parse()?;
            }
            config.logging.filter = logging.filter;
            config.logging.file = logging.file.map(PathBuf::from);
        }

        Ok(config)
    }

    /// Applies `FACTGRAPH_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable has an unparseable value.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable has an unparseable value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("FACTGRAPH_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(v) = parse_var(&get, "FACTGRAPH_BUSY_TIMEOUT_MS")? {
            self.storage.busy_timeout_ms = v;
        }
        if let Some(v) = parse_var(&get, "FACTGRAPH_LOCK_TIMEOUT_MS")? {
            self.storage.lock_timeout_ms = v;
        }
        if let Some(v) = parse_var(&get, "FACTGRAPH_MAX_RETRIES")? {
            self.storage.max_retries = v;
        }
        if let Some(v) = parse_var(&get, "FACTGRAPH_RETRY_BACKOFF_MS")? {
            self.storage.retry_backoff_ms = v;
        }
        if let Some(policy) = get("FACTGRAPH_CONFLICT_POLICY") {
            self.temporal.conflict_policy = policy.parse()?;
        }
        if let Some(labels) = get("FACTGRAPH_ORPHAN_EXCLUDE_LABELS") {
            self.maintenance.orphan_exclude_labels = parse_label_list(&labels)?;
        }
        if let Some(v) = parse_var::<usize>(&get, "FACTGRAPH_ORPHAN_BATCH_SIZE")? {
            self.maintenance.orphan_batch_size = v.max(1);
        }
        if let Some(format) = get("FACTGRAPH_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(filter) = get("FACTGRAPH_LOG") {
            self.logging.filter = Some(filter);
        }

        Ok(self)
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Sets the temporal conflict policy.
    #[must_use]
    pub const fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.temporal.conflict_policy = policy;
        self
    }

    /// Sets the storage settings.
    #[must_use]
    pub const fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::InvalidInput(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

/// Returns the default database location.
///
/// `<platform data dir>/factgraph/graph.db`, or `./factgraph.db` when no home
/// directory can be determined.
#[must_use]
pub fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("factgraph.db"),
        |dirs| dirs.data_dir().join("factgraph").join("graph.db"),
    )
}
