//! engine::classify
//!
//! Closure classifier: was this closed issue's last triage decision a
//! false-positive or won't-fix?
//!
//! # Policy
//!
//! The verdict comes from the most recent changelog entry that changed the
//! resolution and was made by a non-system actor. Scan-generated entries are
//! skipped: when an analyzer closes an issue it overwrites FALSE-POSITIVE
//! with FIXED, and that overwrite is exactly what recovery undoes.
//!
//! A later human transition to FIXED, or a human reopen that cleared the
//! resolution, supersedes an earlier false-positive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::{FieldKey, IssueRecord, Resolution, TransitionEvent};

/// Outcome of classifying one closed issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Last human decision: false positive.
    FalsePositive,
    /// Last human decision: won't fix.
    WontFix,
    /// Last human decision: fixed.
    Fixed,
    /// Last human decision: removed.
    Removed,
    /// Last human change cleared the resolution.
    Reopened,
    /// No human ever changed the resolution.
    NoTriage,
    /// The issue is not closed.
    NotClosed,
    /// The history could not be read or understood.
    Unclassified,
}

impl Verdict {
    /// Whether the closure is mistaken, i.e. recoverable.
    pub fn is_mistaken(&self) -> bool {
        matches!(self, Verdict::FalsePositive | Verdict::WontFix)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::FalsePositive => "false-positive",
            Verdict::WontFix => "wont-fix",
            Verdict::Fixed => "fixed",
            Verdict::Removed => "removed",
            Verdict::Reopened => "reopened",
            Verdict::NoTriage => "no-triage",
            Verdict::NotClosed => "not-closed",
            Verdict::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Resolution> for Verdict {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::FalsePositive => Verdict::FalsePositive,
            Resolution::WontFix => Verdict::WontFix,
            Resolution::Fixed => Verdict::Fixed,
            Resolution::Removed => Verdict::Removed,
        }
    }
}

/// Index of the entry that decides the verdict: the latest non-system entry
/// touching the resolution.
pub fn decisive_index(record: &IssueRecord) -> Option<usize> {
    record
        .changelog()
        .iter()
        .rposition(|e| !e.actor.is_system() && e.touches_resolution())
}

/// The entry that decides the verdict, if any.
pub fn decisive_entry(record: &IssueRecord) -> Option<&TransitionEvent> {
    decisive_index(record).map(|i| &record.changelog()[i])
}

/// Classify a closed issue.
pub fn classify(record: &IssueRecord) -> Verdict {
    if !record.status().is_closed() {
        return Verdict::NotClosed;
    }

    let Some(entry) = decisive_entry(record) else {
        return Verdict::NoTriage;
    };

    let new_value = entry
        .diff(&FieldKey::Resolution)
        .and_then(|d| d.new_value.as_deref())
        .filter(|v| !v.trim().is_empty());

    match new_value {
        None => Verdict::Reopened,
        Some(value) => match value.parse::<Resolution>() {
            Ok(resolution) => resolution.into(),
            Err(_) => {
                tracing::debug!(
                    "{}: unrecognized resolution '{}' in changelog",
                    record.key(),
                    value
                );
                Verdict::Unclassified
            }
        },
    }
}

/// Whether a closed issue's closure hides a false-positive or won't-fix.
pub fn is_mistaken_closure(record: &IssueRecord) -> bool {
    classify(record).is_mistaken()
}
