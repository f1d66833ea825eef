//! Configuration file loading with precedence handling.

use crate::highlight::DEFAULT_HIGHLIGHT_CACHE_CAPACITY;
use crate::view_state::{InitialBufferPosition, DEFAULT_POSITION_SEARCH_ITERATIONS};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "LOGSCOPE_CONFIG";

/// Environment variable overriding the initial buffer position.
pub const INITIAL_POSITION_ENV: &str = "LOGSCOPE_INITIAL_POSITION";

/// Default number of visible lines.
pub const DEFAULT_VIEW_SIZE: f64 = 30.0;

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file path contains invalid UTF-8 or cannot be resolved.
    #[error("Invalid config path: {0}")]
    InvalidPath(String),

    /// Failed to read config file (file may not exist or have permission issues).
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML syntax.
    #[error("Invalid TOML in {path}: {reason}")]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },

    /// A setting parsed but its value is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/logscope/config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Number of visible lines (may be fractional).
    #[serde(default)]
    pub view_size: Option<f64>,

    /// Where the view starts when sources are first set.
    #[serde(default)]
    pub initial_position: Option<InitialBufferPosition>,

    /// Number of messages whose highlight ranges are cached.
    #[serde(default)]
    pub highlight_cache_capacity: Option<usize>,

    /// Center bookmarked lines in the view.
    #[serde(default)]
    pub center_on_bookmark: Option<bool>,

    /// Iteration bound of the timestamp search behind proportional positioning.
    #[serde(default)]
    pub position_search_iterations: Option<u32>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file and env vars.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Number of visible lines.
    pub view_size: f64,
    /// Initial buffer position.
    pub initial_position: InitialBufferPosition,
    /// Highlight cache capacity (raised to the buffer capacity at runtime).
    pub highlight_cache_capacity: usize,
    /// Center bookmarked lines.
    pub center_on_bookmark: bool,
    /// Timestamp search iteration bound.
    pub position_search_iterations: u32,
    /// Path to log file for tracing output.
    pub log_file_path: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            view_size: DEFAULT_VIEW_SIZE,
            initial_position: InitialBufferPosition::StreamsBegin,
            highlight_cache_capacity: DEFAULT_HIGHLIGHT_CACHE_CAPACITY,
            center_on_bookmark: true,
            position_search_iterations: DEFAULT_POSITION_SEARCH_ITERATIONS,
            log_file_path: default_log_path(),
        }
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/logscope/logscope.log` on Unix-like systems,
/// or appropriate platform path on other systems.
///
/// If state directory cannot be determined, falls back to current directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        state_dir.join("logscope").join("logscope.log")
    } else {
        PathBuf::from("logscope.log")
    }
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    // Missing file is not an error - use defaults
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path.
///
/// Returns `~/.config/logscope/config.toml` on Unix, appropriate path on other
/// platforms. Returns `None` if home directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("logscope").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument
/// 2. `LOGSCOPE_CONFIG` environment variable
/// 3. Default path `~/.config/logscope/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
///
/// # Errors
///
/// Returns error only if a config file exists but cannot be read or parsed, or if
/// `LOGSCOPE_CONFIG` is set to an empty or non-UTF-8 value.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    match std::env::var(CONFIG_PATH_ENV) {
        Ok(env_path) if env_path.trim().is_empty() => {
            return Err(ConfigError::InvalidPath(format!("{} is empty", CONFIG_PATH_ENV)));
        }
        Ok(env_path) => return load_config_file(PathBuf::from(env_path)),
        Err(std::env::VarError::NotUnicode(raw)) => {
            return Err(ConfigError::InvalidPath(raw.to_string_lossy().into_owned()));
        }
        Err(std::env::VarError::NotPresent) => {}
    }

    if let Some(default_path) = default_config_path() {
        return load_config_file(default_path);
    }

    Ok(None)
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for a view size that is not positive and
/// finite or a zero search iteration bound.
pub fn merge_config(config_file: Option<ConfigFile>) -> Result<ResolvedConfig, ConfigError> {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return Ok(defaults);
    };

    let view_size = config.view_size.unwrap_or(defaults.view_size);
    if !(view_size.is_finite() && view_size > 0.0) {
        return Err(ConfigError::InvalidValue {
            field: "view_size",
            reason: format!("must be a positive number, got {}", view_size),
        });
    }

    let position_search_iterations = config
        .position_search_iterations
        .unwrap_or(defaults.position_search_iterations);
    if position_search_iterations == 0 {
        return Err(ConfigError::InvalidValue {
            field: "position_search_iterations",
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(ResolvedConfig {
        view_size,
        initial_position: config.initial_position.unwrap_or(defaults.initial_position),
        highlight_cache_capacity: config
            .highlight_cache_capacity
            .unwrap_or(defaults.highlight_cache_capacity),
        center_on_bookmark: config
            .center_on_bookmark
            .unwrap_or(defaults.center_on_bookmark),
        position_search_iterations,
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
    })
}

/// Apply environment variable overrides to resolved config.
///
/// Checks for:
/// - `LOGSCOPE_INITIAL_POSITION`: Override initial buffer position
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if the variable does not name a position.
pub fn apply_env_overrides(mut config: ResolvedConfig) -> Result<ResolvedConfig, ConfigError> {
    if let Ok(position) = std::env::var(INITIAL_POSITION_ENV) {
        config.initial_position =
            position
                .parse()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "initial_position",
                    reason,
                })?;
    }

    Ok(config)
}

/// Load, merge and override in one go: the configuration the engine runs with.
///
/// # Errors
///
/// Any error of [`load_config_with_precedence`], [`merge_config`] or
/// [`apply_env_overrides`].
pub fn load_config(config_path: Option<PathBuf>) -> Result<ResolvedConfig, ConfigError> {
    let file = load_config_with_precedence(config_path)?;
    apply_env_overrides(merge_config(file)?)
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;

#[cfg(test)]
mod log_path_tests {
    use super::*;

    #[test]
    fn default_log_path_ends_with_logscope_log() {
        let path = default_log_path();
        assert!(
            path.to_string_lossy().ends_with("logscope.log"),
            "Default log path should end with 'logscope.log', got: {:?}",
            path
        );
    }

    #[test]
    fn resolved_config_default_includes_log_path() {
        let config = ResolvedConfig::default();
        assert!(
            !config.log_file_path.as_os_str().is_empty(),
            "Default config should have non-empty log_file_path"
        );
    }

    #[test]
    fn config_file_log_path_overrides_default() {
        let custom_path = PathBuf::from("/custom/path/to/app.log");
        let config_file = ConfigFile {
            log_file_path: Some(custom_path.clone()),
            ..ConfigFile::default()
        };

        let resolved = merge_config(Some(config_file)).unwrap();
        assert_eq!(
            resolved.log_file_path, custom_path,
            "Config file log_file_path should override default"
        );
    }
}
