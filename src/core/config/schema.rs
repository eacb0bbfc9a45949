//! core::config::schema
//!
//! Configuration schema types.
//!
//! # File
//!
//! Located at (in order of precedence):
//! 1. `--config <path>` / `$TREC_CONFIG`
//! 2. `$XDG_CONFIG_HOME/triage-recover/config.toml`
//! 3. `~/.triage-recover/config.toml` (canonical write location)
//!
//! # Validation
//!
//! Values are validated after parsing: URLs must be http(s), numeric knobs
//! must be within range, and attribute names must be known.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::TriageAttribute;

/// Maximum page size accepted by `api/issues/search`.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Upper bound on concurrent per-issue requests.
pub const MAX_CONCURRENCY: usize = 64;

/// Keys accepted by `trec config get/set`.
pub const KNOWN_KEYS: &[&str] = &[
    "server.url",
    "server.token",
    "recover.attributes",
    "recover.dry_run",
    "recover.concurrency",
    "recover.components",
    "retry.max_attempts",
    "retry.base_delay_ms",
    "retry.max_delay_ms",
    "search.page_size",
];

/// Top-level configuration file.
///
/// # Example
///
/// ```toml
/// [server]
/// url = "https://sonar.example.com"
///
/// [recover]
/// attributes = ["resolution", "severity"]
/// dry_run = true
/// concurrency = 8
///
/// [retry]
/// max_attempts = 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Tracker server settings
    pub server: Option<ServerConfig>,

    /// Recovery defaults
    pub recover: Option<RecoverDefaults>,

    /// Retry policy for reads
    pub retry: Option<RetrySettings>,

    /// Bulk search settings
    pub search: Option<SearchSettings>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(server) = &self.server {
            server.validate()?;
        }
        if let Some(recover) = &self.recover {
            recover.validate()?;
        }
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        if let Some(search) = &self.search {
            search.validate()?;
        }
        Ok(())
    }

    /// Read a dotted key as display text. `None` when unset.
    pub fn get_key(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let server = self.server.as_ref();
        let recover = self.recover.as_ref();
        let retry = self.retry.as_ref();

        let value = match key {
            "server.url" => server.and_then(|s| s.url.clone()),
            "server.token" => server.and_then(|s| s.token.as_deref().map(redact_token)),
            "recover.attributes" => recover
                .and_then(|r| r.attributes.as_ref())
                .map(|a| a.join(",")),
            "recover.dry_run" => recover.and_then(|r| r.dry_run).map(|v| v.to_string()),
            "recover.concurrency" => recover.and_then(|r| r.concurrency).map(|v| v.to_string()),
            "recover.components" => recover
                .and_then(|r| r.components.as_ref())
                .map(|c| c.join(",")),
            "retry.max_attempts" => retry.and_then(|r| r.max_attempts).map(|v| v.to_string()),
            "retry.base_delay_ms" => retry.and_then(|r| r.base_delay_ms).map(|v| v.to_string()),
            "retry.max_delay_ms" => retry.and_then(|r| r.max_delay_ms).map(|v| v.to_string()),
            "search.page_size" => self
                .search
                .as_ref()
                .and_then(|s| s.page_size)
                .map(|v| v.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Set a dotted key from text, then re-validate.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "server.url" => server(self).url = Some(value.trim().to_string()),
            "server.token" => server(self).token = Some(value.trim().to_string()),
            "recover.attributes" => recover(self).attributes = Some(split_list(value)),
            "recover.dry_run" => recover(self).dry_run = Some(parse_value(key, value)?),
            "recover.concurrency" => recover(self).concurrency = Some(parse_value(key, value)?),
            "recover.components" => recover(self).components = Some(split_list(value)),
            "retry.max_attempts" => retry(self).max_attempts = Some(parse_value(key, value)?),
            "retry.base_delay_ms" => retry(self).base_delay_ms = Some(parse_value(key, value)?),
            "retry.max_delay_ms" => retry(self).max_delay_ms = Some(parse_value(key, value)?),
            "search.page_size" => {
                self.search.get_or_insert_with(Default::default).page_size =
                    Some(parse_value(key, value)?)
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        self.validate()
    }
}

fn server(config: &mut GlobalConfig) -> &mut ServerConfig {
    config.server.get_or_insert_with(Default::default)
}

fn recover(config: &mut GlobalConfig) -> &mut RecoverDefaults {
    config.recover.get_or_insert_with(Default::default)
}

fn retry(config: &mut GlobalConfig) -> &mut RetrySettings {
    config.retry.get_or_insert_with(Default::default)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("invalid value '{}' for {}", value, key)))
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Mask all but the first and last three characters of a token.
pub fn redact_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Tracker server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Root URL of the server
    pub url: Option<String>,

    /// API token. Prefer `$SONAR_TOKEN` over storing it here.
    pub token: Option<String>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "server url '{}' must start with http:// or https://",
                    url
                )));
            }
        }
        if let Some(token) = &self.token {
            if token.is_empty() {
                return Err(ConfigError::InvalidValue("token cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Recovery defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RecoverDefaults {
    /// Attributes to carry forward (resolution, type, severity, assignee, tags, comments)
    pub attributes: Option<Vec<String>>,

    /// Report without writing
    pub dry_run: Option<bool>,

    /// Concurrent per-issue requests
    pub concurrency: Option<usize>,

    /// Component/project keys that scope both searches
    pub components: Option<Vec<String>>,
}

impl RecoverDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(attributes) = &self.attributes {
            for a in attributes {
                a.parse::<TriageAttribute>()
                    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            }
        }
        if let Some(n) = self.concurrency {
            if n == 0 || n > MAX_CONCURRENCY {
                return Err(ConfigError::InvalidValue(format!(
                    "concurrency must be between 1 and {}",
                    MAX_CONCURRENCY
                )));
            }
        }
        Ok(())
    }
}

/// Retry policy for bulk searches and changelog reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempts including the first one
    pub max_attempts: Option<u32>,

    /// Delay before the first retry
    pub base_delay_ms: Option<u64>,

    /// Cap on the delay between retries
    pub max_delay_ms: Option<u64>,
}

impl RetrySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if let (Some(base), Some(max)) = (self.base_delay_ms, self.max_delay_ms) {
            if base > max {
                return Err(ConfigError::InvalidValue(
                    "retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Bulk search settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSettings {
    /// Page size for `api/issues/search` (max 500)
    pub page_size: Option<u32>,
}

impl SearchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ps) = self.page_size {
            if ps == 0 || ps > MAX_PAGE_SIZE {
                return Err(ConfigError::InvalidValue(format!(
                    "search.page_size must be between 1 and {}",
                    MAX_PAGE_SIZE
                )));
            }
        }
        Ok(())
    }
}
