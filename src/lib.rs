//! triage-recover - Recover triage lost when SonarQube issues are closed
//!
//! When a file is moved, or a rule or analyzer changes, SonarQube closes the
//! existing issues and opens fresh ones for the same findings. Any triage on
//! the old issues (false-positive or won't-fix resolutions, severity, type,
//! assignee, tags) stays behind on closed issues. This crate finds those
//! closures, matches each to its open sibling, and replays the triage.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Fetch → Intake → Hydrate → Classify → Match → Replay
//! - [`core`] - Domain types, fingerprints, and configuration
//! - [`tracker`] - Abstraction over the issue server (SonarQube Web API)
//! - [`ui`] - Output formatting
//!
//! # Correctness Invariants
//!
//! 1. Closed issues are never written
//! 2. Triage is only replayed onto a unique sibling
//! 3. Dry runs perform no writes
//! 4. A second run over the same data writes nothing

pub mod cli;
pub mod core;
pub mod engine;
pub mod tracker;
pub mod ui;
