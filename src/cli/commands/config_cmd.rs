//! config command - Get, set, or list configuration values

use std::path::PathBuf;

use super::Context;
use crate::core::config::schema::{redact_token, KNOWN_KEYS};
use crate::core::config::Config;
use crate::ui::output::Verbosity;
use anyhow::{Context as _, Result};

/// Effective value of `key` after environment overrides and defaults.
///
/// Tokens are redacted. `None` means unset with no default.
pub fn effective_value(config: &Config, key: &str) -> Result<Option<String>> {
    // Rejects unknown keys before computing anything.
    config.global.get_key(key)?;

    let retry = config.retry_policy();
    let value = match key {
        "server.url" => Some(config.url()),
        "server.token" => config.token().map(redact_token),
        "recover.attributes" => Some(
            config
                .attributes()?
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ),
        "recover.dry_run" => Some(config.dry_run().to_string()),
        "recover.concurrency" => Some(config.concurrency().to_string()),
        "recover.components" => {
            let components = config.components();
            (!components.is_empty()).then(|| components.join(","))
        }
        "retry.max_attempts" => Some(retry.max_attempts.to_string()),
        "retry.base_delay_ms" => Some(retry.base_delay.as_millis().to_string()),
        "retry.max_delay_ms" => Some(retry.max_delay.as_millis().to_string()),
        "search.page_size" => Some(config.page_size().to_string()),
        _ => None,
    };
    Ok(value)
}

/// Get a configuration value.
pub fn get(ctx: &Context, key: &str) -> Result<()> {
    if let Some(value) = effective_value(&ctx.config, key)? {
        println!("{}", value);
    }
    // Key exists but has no value - exit silently
    Ok(())
}

/// Set a configuration value in the config file.
pub fn set(ctx: &Context, key: &str, value: &str) -> Result<()> {
    let path = target_path(ctx)?;

    let mut global = ctx.config.global.clone();
    global
        .set_key(key, value)
        .with_context(|| format!("Cannot set {}", key))?;

    Config::write_atomic(&path, &global).context("Failed to write config")?;

    if ctx.verbosity != Verbosity::Quiet {
        // Never echo a token back.
        let shown = if key == "server.token" {
            redact_token(value.trim())
        } else {
            value.to_string()
        };
        println!("Set {} = {}", key, shown);
    }

    Ok(())
}

/// List all configuration values.
pub fn list(ctx: &Context) -> Result<()> {
    match ctx.config.path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# defaults (no config file)"),
    }

    for key in KNOWN_KEYS {
        match effective_value(&ctx.config, key)? {
            Some(value) => println!("{} = {}", key, value),
            None => println!("{} = (not set)", key),
        }
    }

    Ok(())
}

/// Print the config file that `set` writes to.
pub fn path(ctx: &Context) -> Result<()> {
    println!("{}", target_path(ctx)?.display());
    Ok(())
}

/// Loaded file, else `--config`, else the canonical location.
fn target_path(ctx: &Context) -> Result<PathBuf> {
    if let Some(path) = ctx.config.path() {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = &ctx.config_path {
        return Ok(path.clone());
    }
    Ok(Config::global_config_path()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{EnvOverrides, GlobalConfig};
    use tempfile::TempDir;

    fn config(global: GlobalConfig, env: EnvOverrides) -> Config {
        Config::from_parts(global, env)
    }

    #[test]
    fn defaults_are_reported() {
        let c = config(GlobalConfig::default(), EnvOverrides::default());
        assert_eq!(
            effective_value(&c, "server.url").unwrap().as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(
            effective_value(&c, "recover.dry_run").unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(
            effective_value(&c, "recover.attributes").unwrap().as_deref(),
            Some("resolution,type,severity,assignee,tags,comments")
        );
        assert_eq!(effective_value(&c, "server.token").unwrap(), None);
        assert_eq!(effective_value(&c, "recover.components").unwrap(), None);
    }

    #[test]
    fn environment_token_is_redacted() {
        let env = EnvOverrides {
            url: None,
            token: Some("squ_abcdef123456".into()),
        };
        let c = config(GlobalConfig::default(), env);
        let shown = effective_value(&c, "server.token").unwrap().unwrap();
        assert!(!shown.contains("abcdef"));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let c = config(GlobalConfig::default(), EnvOverrides::default());
        assert!(effective_value(&c, "server.port").is_err());
    }

    #[test]
    fn set_writes_the_explicit_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested/config.toml");
        let ctx = Context {
            config: config(GlobalConfig::default(), EnvOverrides::default()),
            config_path: Some(file.clone()),
            url: None,
            token: None,
            verbosity: Verbosity::Quiet,
        };

        set(&ctx, "recover.concurrency", "4").unwrap();

        let written = Config::read_config(&file).unwrap();
        assert_eq!(
            written.get_key("recover.concurrency").unwrap().as_deref(),
            Some("4")
        );
    }

    #[test]
    fn set_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("config.toml");
        let ctx = Context {
            config: config(GlobalConfig::default(), EnvOverrides::default()),
            config_path: Some(file.clone()),
            url: None,
            token: None,
            verbosity: Verbosity::Quiet,
        };

        assert!(set(&ctx, "recover.dry_run", "maybe").is_err());
        assert!(!file.exists());
    }
}
