//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment (`SONAR_HOST_URL`, `SONAR_TOKEN`)
//! 4. CLI flags (not handled here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. Explicit path (`--config`, or `$TREC_CONFIG` through the CLI)
//! 2. `$XDG_CONFIG_HOME/triage-recover/config.toml`
//! 3. `~/.triage-recover/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use triage_recover::core::config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("Server: {}", config.url());
//! println!("Dry run: {}", config.dry_run());
//! ```

pub mod schema;

pub use schema::GlobalConfig;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::types::TriageAttribute;
use crate::tracker::retry::RetryPolicy;

/// Server used when nothing else is configured.
pub const DEFAULT_URL: &str = "http://localhost:9000";

/// Concurrent per-issue requests when not configured.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Search page size when not configured.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Environment variable holding the server URL.
pub const URL_ENV: &str = "SONAR_HOST_URL";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "SONAR_TOKEN";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Values taken from the environment, applied over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl EnvOverrides {
    /// Collect overrides through `lookup`. Empty values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            url: non_empty(URL_ENV),
            token: non_empty(TOKEN_ENV),
        }
    }

    pub fn from_process_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

/// Configuration from file and environment.
///
/// Accessor methods apply precedence and defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// File configuration
    pub global: GlobalConfig,
    /// Environment overrides
    pub env: EnvOverrides,
    /// Path the file was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `explicit` or the default locations, then
    /// apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// holds invalid values, or if an explicit path does not exist.
    /// A missing default file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (global, path) = match explicit {
            Some(path) => (Self::read_config(path)?, Some(path.to_path_buf())),
            None => Self::load_default()?,
        };
        global.validate()?;

        Ok(Config {
            global,
            env: EnvOverrides::from_process_env(),
            path,
        })
    }

    /// Build a config from parts, without touching the filesystem.
    pub fn from_parts(global: GlobalConfig, env: EnvOverrides) -> Self {
        Config {
            global,
            env,
            path: None,
        }
    }

    fn load_default() -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        for path in Self::search_paths() {
            if path.exists() {
                let config = Self::read_config(&path)?;
                return Ok((config, Some(path)));
            }
        }
        Ok((GlobalConfig::default(), None))
    }

    /// Default locations, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_home).join("triage-recover/config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".triage-recover/config.toml"));
        }
        paths
    }

    /// Read and parse a config file.
    pub fn read_config(path: &Path) -> Result<GlobalConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Path the config was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Canonical write location, `~/.triage-recover/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".triage-recover/config.toml"))
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames it over the target.
    pub fn write_atomic(path: &Path, config: &GlobalConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Server URL without a trailing slash.
    ///
    /// Defaults to `http://localhost:9000`.
    pub fn url(&self) -> String {
        let url = self
            .env
            .url
            .as_deref()
            .or_else(|| self.global.server.as_ref().and_then(|s| s.url.as_deref()))
            .unwrap_or(DEFAULT_URL);
        url.trim_end_matches('/').to_string()
    }

    /// API token, if any.
    pub fn token(&self) -> Option<&str> {
        self.env
            .token
            .as_deref()
            .or_else(|| self.global.server.as_ref().and_then(|s| s.token.as_deref()))
    }

    /// Attributes to recover.
    ///
    /// Defaults to every attribute.
    pub fn attributes(&self) -> Result<Vec<TriageAttribute>, ConfigError> {
        match self
            .global
            .recover
            .as_ref()
            .and_then(|r| r.attributes.as_ref())
        {
            Some(names) => names
                .iter()
                .map(|n| {
                    n.parse::<TriageAttribute>()
                        .map_err(|e| ConfigError::InvalidValue(e.to_string()))
                })
                .collect(),
            None => Ok(TriageAttribute::ALL.to_vec()),
        }
    }

    /// Whether runs report without writing.
    ///
    /// Defaults to `true`.
    pub fn dry_run(&self) -> bool {
        self.global
            .recover
            .as_ref()
            .and_then(|r| r.dry_run)
            .unwrap_or(true)
    }

    /// Concurrent per-issue requests.
    ///
    /// Defaults to 8.
    pub fn concurrency(&self) -> usize {
        self.global
            .recover
            .as_ref()
            .and_then(|r| r.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// Component keys that scope the searches. Empty means unscoped.
    pub fn components(&self) -> &[String] {
        self.global
            .recover
            .as_ref()
            .and_then(|r| r.components.as_deref())
            .unwrap_or(&[])
    }

    /// Retry policy for reads.
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let Some(retry) = self.global.retry.as_ref() else {
            return defaults;
        };
        RetryPolicy {
            max_attempts: retry.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        }
    }

    /// Search page size.
    ///
    /// Defaults to 500.
    pub fn page_size(&self) -> u32 {
        self.global
            .search
            .as_ref()
            .and_then(|s| s.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}
