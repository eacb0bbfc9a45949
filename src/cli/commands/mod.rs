//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Calls the engine to execute the command
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! `recover` talks to the server, so it builds a tokio runtime and blocks on
//! the async implementation.

mod completion;
mod config_cmd;
mod recover;

pub use completion::completion;
pub use config_cmd::{effective_value, get, list, path, set};
pub use recover::{recover, RecoverArgs};

use std::path::PathBuf;

use crate::cli::args::{Command, ConfigAction};
use crate::core::config::Config;
use crate::ui::output::Verbosity;
use anyhow::Result;

/// Settings shared by every command.
#[derive(Debug)]
pub struct Context {
    /// Configuration from file and environment
    pub config: Config,
    /// `--config` / `$TREC_CONFIG`
    pub config_path: Option<PathBuf>,
    /// `--url`
    pub url: Option<String>,
    /// `--token`
    pub token: Option<String>,
    pub verbosity: Verbosity,
}

impl Context {
    /// Server URL: flag, then environment/config, then default.
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => self.config.url(),
        }
    }

    /// Token: flag, then environment/config.
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| self.config.token().map(str::to_string))
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Recover {
            components,
            apply,
            recover,
            json,
            concurrency,
        } => recover::recover(
            ctx,
            RecoverArgs {
                components,
                apply,
                attributes: recover,
                json,
                concurrency,
            },
        ),
        Command::Config { action } => match action {
            ConfigAction::Get { key } => config_cmd::get(ctx, &key),
            ConfigAction::Set { key, value } => config_cmd::set(ctx, &key, &value),
            ConfigAction::List => config_cmd::list(ctx),
            ConfigAction::Path => config_cmd::path(ctx),
        },
        Command::Completion { shell } => completion::completion(shell, &mut std::io::stdout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{EnvOverrides, GlobalConfig};

    fn ctx(url: Option<&str>, env_url: Option<&str>) -> Context {
        Context {
            config: Config::from_parts(
                GlobalConfig::default(),
                EnvOverrides {
                    url: env_url.map(str::to_string),
                    token: Some("env-token".into()),
                },
            ),
            config_path: None,
            url: url.map(str::to_string),
            token: None,
            verbosity: Verbosity::Normal,
        }
    }

    #[test]
    fn flag_overrides_environment() {
        let c = ctx(Some("https://flag.example.com/"), Some("https://env.example.com"));
        assert_eq!(c.url(), "https://flag.example.com");
    }

    #[test]
    fn environment_when_no_flag() {
        let c = ctx(None, Some("https://env.example.com"));
        assert_eq!(c.url(), "https://env.example.com");
        assert_eq!(c.token().as_deref(), Some("env-token"));
    }
}
