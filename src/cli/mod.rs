//! cli
//!
//! Command-line interface layer for triage-recover.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Initialize logging
//! - Load configuration and delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It resolves settings (flags over environment over
//! config file over defaults), builds the tracker, and hands off to
//! [`crate::engine`]. All issue reads and writes flow through the engine.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::{Context as _, Result};

use crate::core::config::{Config, EnvOverrides, GlobalConfig};
use crate::ui::output::Verbosity;
use args::Command;
use commands::Context;

/// Environment variable that overrides the log filter.
pub const LOG_ENV: &str = "TREC_LOG";

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);
    init_tracing(verbosity)?;

    // Completion needs no configuration.
    if let Command::Completion { shell } = cli.command {
        return commands::completion(shell, &mut std::io::stdout());
    }

    let config = match (&cli.command, cli.config.as_deref()) {
        // `config set` may create the file named by --config.
        (Command::Config { .. }, Some(path)) if !path.exists() => {
            Config::from_parts(GlobalConfig::default(), EnvOverrides::from_process_env())
        }
        (_, explicit) => Config::load(explicit).context("Failed to load configuration")?,
    };
    if let Some(path) = config.path() {
        tracing::debug!("loaded configuration from {}", path.display());
    }

    let ctx = Context {
        config,
        config_path: cli.config,
        url: cli.url,
        token: cli.token,
        verbosity,
    };

    commands::dispatch(cli.command, &ctx)
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `$TREC_LOG` takes precedence over the level implied by the flags.
fn init_tracing(verbosity: Verbosity) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
