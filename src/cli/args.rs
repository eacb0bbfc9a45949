//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--url <URL>`: Server URL (also `$SONAR_HOST_URL`)
//! - `--token <TOKEN>`: API token (also `$SONAR_TOKEN`)
//! - `--config <PATH>`: Config file (also `$TREC_CONFIG`)
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// triage-recover - Recover triage lost when SonarQube issues are closed
#[derive(Parser, Debug)]
#[command(name = "trec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server URL [default: http://localhost:9000]
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// API token (prefer $SONAR_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Config file to use instead of the default locations
    #[arg(long, global = true, env = "TREC_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recover triage from mistakenly closed issues
    #[command(
        name = "recover",
        long_about = "Recover triage from mistakenly closed issues.\n\n\
            Finds closed issues whose last human decision was false-positive or \
            won't-fix, looks for the open issue that is the same finding (same rule, \
            component and message), and carries the triage over when exactly one \
            such issue exists. Several matches are reported for manual resolution.\n\n\
            Nothing is written unless --apply is given (or dry_run = false is set \
            in the config file).",
        after_help = "\
WORKFLOW EXAMPLES:
    # Preview what would be recovered in one project
    trec recover -k my-project

    # Apply it
    trec recover -k my-project --apply

    # Only recover false-positive/won't-fix and severity
    trec recover -k my-project --recover resolution,severity --apply

    # Machine-readable report
    trec recover -k my-project --json > report.json"
    )]
    Recover {
        /// Component or project key to scope the searches (repeatable)
        #[arg(short = 'k', long = "component", value_name = "KEY")]
        components: Vec<String>,

        /// Write the changes (default is a dry run)
        #[arg(long)]
        apply: bool,

        /// Attributes to recover: resolution, type, severity, assignee, tags, comments
        #[arg(long, value_delimiter = ',', value_name = "ATTR")]
        recover: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Concurrent requests to the server
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// View or modify configuration
    #[command(
        name = "config",
        long_about = "View or modify triage-recover configuration.\n\n\
            Configuration is stored in ~/.triage-recover/config.toml unless \
            --config or $TREC_CONFIG points elsewhere.",
        after_help = "\
WORKFLOW EXAMPLES:
    # List all configuration values
    trec config list

    # Get a specific value
    trec config get server.url

    # Set a value
    trec config set recover.concurrency 4"
    )]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        long_about = "Generate shell completion scripts for tab-completion.\n\n\
            Outputs a completion script for the specified shell.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Bash (add to ~/.bashrc)
    trec completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    trec completion zsh >> ~/.zshrc

    # Fish
    trec completion fish > ~/.config/fish/completions/trec.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
    },
    /// List all configuration values
    List,
    /// Print the config file path
    Path,
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
