//! engine
//!
//! Recovery pipeline: Fetch -> Intake -> Hydrate -> Classify -> Match -> Replay.
//!
//! # Architecture
//!
//! 1. **Fetch**: Pull the closed set and the candidate set once, up front
//! 2. **Intake**: Validate raw records, skipping malformed ones
//! 3. **Hydrate**: Read the changelog of each closed issue
//! 4. **Classify**: Keep closures whose last human decision was FP/WONTFIX
//! 5. **Match**: Find each one's open sibling by fingerprint
//! 6. **Replay**: Carry the triage over when the sibling is unique
//!
//! # Invariants
//!
//! - Closed issues are never written
//! - Nothing is written when the match is not unique
//! - Dry runs perform no writes
//! - Replaying onto an already recovered sibling writes nothing
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use triage_recover::engine::{recover, RunOptions, Scope};
//!
//! let report = recover(tracker, &Scope::default(), &RunOptions::default()).await?;
//! println!("{} applied", report.summary().applied);
//! ```

pub mod classify;
pub mod intake;
pub mod matcher;
pub mod replay;
pub mod report;
pub mod runner;

pub use classify::{classify, is_mistaken_closure, Verdict};
pub use matcher::{find_siblings, match_siblings, CandidatePool, SiblingMatch};
pub use replay::{apply_changelog, RecoverySet, ReplayError, ReplayOutcome};
pub use report::{Action, RecoveryReport, ReportEntry, ReportSummary};
pub use runner::{fetch_issue_sets, recover, run, CancelFlag, RunError, RunOptions, Scope};
