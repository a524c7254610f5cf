// crates/camstate-config/src/config.rs
// ============================================================================
// Module: camstate Configuration
// Description: Configuration model, loader, and validation for camstate.toml.
// Purpose: Load bounded, strictly typed configuration and fail closed.
// Dependencies: camstate-core, camstate-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`CamstateConfig`] is loaded from an explicit path, then the
//! `CAMSTATE_CONFIG` environment variable, then `./camstate.toml`. Input is
//! untrusted: the path and file size are bounded, the file must be UTF-8,
//! unknown fields are rejected, and [`CamstateConfig::validate`] runs before
//! the value is returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use camstate_core::DispatchConfig;
use camstate_store_sqlite::SqliteStoreConfig;
use camstate_store_sqlite::SqliteStoreMode;
use camstate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config filename in the working directory.
pub const DEFAULT_CONFIG_NAME: &str = "camstate.toml";
/// Environment variable naming the config path.
pub const CONFIG_ENV_VAR: &str = "CAMSTATE_CONFIG";
/// Maximum config file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Upper bound on dispatcher lanes.
const MAX_LANES: usize = 64;
/// Upper bound on a single observer timeout.
const MAX_OBSERVER_TIMEOUT_MS: u64 = 60_000;
/// Default state value database.
const DEFAULT_STATE_PATH: &str = "/var/lib/camstate/state.sqlite";
/// Default metadata database.
const DEFAULT_METADATA_PATH: &str = "/var/lib/camstate/metadata.sqlite";
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default log filter.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// File could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML did not match the model.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Values failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CamstateConfig {
    /// Database locations and pragmas.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Observer dispatcher sizing.
    #[serde(default)]
    pub dispatch: DispatchSection,
    /// Factory reset policy.
    #[serde(default)]
    pub reset: ResetConfig,
    /// Mutation audit sink.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Log filter.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Key-value database for persistent state entries.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Relational database for categories, tags, and recordings.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,
    /// Busy timeout in milliseconds for both databases.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode for both databases.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Sync mode for both databases.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            metadata_path: default_metadata_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StorageConfig {
    /// Returns the value store connection settings.
    #[must_use]
    pub fn state_store(&self) -> SqliteStoreConfig {
        self.store_config(&self.state_path)
    }

    /// Returns the metadata store connection settings.
    #[must_use]
    pub fn metadata_store(&self) -> SqliteStoreConfig {
        self.store_config(&self.metadata_path)
    }

    /// Builds store settings for `path`.
    fn store_config(&self, path: &Path) -> SqliteStoreConfig {
        let mut config = SqliteStoreConfig::new(path);
        config.busy_timeout_ms = self.busy_timeout_ms;
        config.journal_mode = self.journal_mode;
        config.sync_mode = self.sync_mode;
        config
    }
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    /// Worker lanes.
    #[serde(default = "default_lanes")]
    pub lanes: usize,
    /// Pending deliveries per lane.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Upper bound on one observer call, in milliseconds.
    #[serde(default = "default_observer_timeout_ms")]
    pub observer_timeout_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            lanes: default_lanes(),
            queue_capacity: default_queue_capacity(),
            observer_timeout_ms: default_observer_timeout_ms(),
        }
    }
}

impl DispatchSection {
    /// Converts the section into dispatcher settings.
    #[must_use]
    pub const fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            lanes: self.lanes,
            queue_capacity: self.queue_capacity,
            observer_timeout: Duration::from_millis(self.observer_timeout_ms),
        }
    }
}

/// `[reset]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetConfig {
    /// Entries kept across a factory reset.
    #[serde(default = "default_preserve_keys")]
    pub preserve_keys: BTreeSet<String>,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            preserve_keys: default_preserve_keys(),
        }
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// Discard audit events.
    #[default]
    None,
    /// JSON lines on stderr.
    Stderr,
    /// JSON lines appended to `path`.
    File,
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Target file for the `file` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl CamstateConfig {
    /// Loads and validates configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved, "config")?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content =
            std::str::from_utf8(&bytes).map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source = Some(resolved);
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_path(&self.storage.state_path, "storage.state_path")?;
        validate_path(&self.storage.metadata_path, "storage.metadata_path")?;
        if self.storage.state_path == self.storage.metadata_path {
            return Err(ConfigError::Invalid(
                "storage.state_path and storage.metadata_path must differ".to_string(),
            ));
        }
        if self.storage.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid("storage.busy_timeout_ms must be positive".to_string()));
        }
        if self.dispatch.lanes == 0 || self.dispatch.lanes > MAX_LANES {
            return Err(ConfigError::Invalid(format!("dispatch.lanes must be between 1 and {MAX_LANES}")));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid("dispatch.queue_capacity must be positive".to_string()));
        }
        if self.dispatch.observer_timeout_ms == 0 || self.dispatch.observer_timeout_ms > MAX_OBSERVER_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "dispatch.observer_timeout_ms must be between 1 and {MAX_OBSERVER_TIMEOUT_MS}"
            )));
        }
        if self.reset.preserve_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(ConfigError::Invalid("reset.preserve_keys entries must be non-empty".to_string()));
        }
        match (self.audit.sink, &self.audit.path) {
            (AuditSinkKind::File, None) => {
                return Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()));
            }
            (_, Some(path)) => validate_path(path, "audit.path")?,
            (_, None) => {}
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from explicit input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates path length and components.
fn validate_path(path: &Path, field: &str) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} path exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default state value database path.
fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

/// Default metadata database path.
fn default_metadata_path() -> PathBuf {
    PathBuf::from(DEFAULT_METADATA_PATH)
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default lane count.
const fn default_lanes() -> usize {
    4
}

/// Default queue capacity.
const fn default_queue_capacity() -> usize {
    1024
}

/// Default observer timeout.
const fn default_observer_timeout_ms() -> u64 {
    2_000
}

/// Keys kept by a factory reset unless configured otherwise.
fn default_preserve_keys() -> BTreeSet<String> {
    [camstate_core::CATEGORIES_KEY, camstate_core::CATEGORY_COUNTER_KEY].iter().map(ToString::to_string).collect()
}

/// Default log filter.
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
