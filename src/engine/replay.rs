//! engine::replay
//!
//! Changelog replay: carry a closed issue's triage decision over to its
//! open sibling.
//!
//! # Triage Window
//!
//! Only the decision that led to the closure is carried over: the decisive
//! resolution entry plus the contiguous run of human entries right before
//! it that did not touch status or resolution (the severity bump, the
//! re-typing, the tagging done while triaging). Within the window the latest
//! value of each attribute wins.
//!
//! # Assignee and Comments
//!
//! Changelogs record the assignee by display name. It is mapped back to a
//! login through the tracker before planning; a name that maps to no single
//! user drops the attribute. The source's comments are copied unless the
//! destination already has one with the same text, and recovery notes are
//! never copied.
//!
//! # Writes
//!
//! The full change set is computed before anything is written and applied in
//! one tracker call. Attributes already matching the destination are left
//! out, so replaying twice writes nothing the second time. Failed writes are
//! reported with the changes they left behind, never retried.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classify::{classify, decisive_index, Verdict};
use crate::core::types::{
    AttributeChange, ChangeSet, FieldKey, IssueKey, IssueRecord, IssueSummary, IssueType,
    Resolution, Severity, TransitionEvent, TriageAttribute,
};
use crate::tracker::{IssueTracker, TrackerError};

/// Errors that prevent a replay from being attempted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReplayError {
    /// Closed issues never receive writes.
    #[error("destination {0} is closed")]
    DestinationClosed(IssueKey),

    /// The source's closure is not a mistaken one.
    #[error("source {key} is not a mistaken closure ({verdict})")]
    NotMistaken { key: IssueKey, verdict: Verdict },
}

/// Attributes a replay may write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySet(BTreeSet<TriageAttribute>);

impl RecoverySet {
    /// Every attribute.
    pub fn all() -> Self {
        Self(TriageAttribute::ALL.iter().copied().collect())
    }

    pub fn contains(&self, attribute: TriageAttribute) -> bool {
        self.0.contains(&attribute)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TriageAttribute> + '_ {
        self.0.iter().copied()
    }
}

impl Default for RecoverySet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<TriageAttribute> for RecoverySet {
    fn from_iter<I: IntoIterator<Item = TriageAttribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RecoverySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|a| a.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Result of one replay.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// The destination already carries every recovered attribute.
    AlreadyInSync,
    /// Dry run: the change set that would have been written.
    Planned(ChangeSet),
    /// The change set was written.
    Applied(ChangeSet),
    /// The write failed.
    Failed {
        change_set: ChangeSet,
        /// Changes still on the destination
        applied: Vec<AttributeChange>,
        error: TrackerError,
    },
}

/// Triage state replayed from a source's triage window.
///
/// `None` means the window never touched the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageState {
    pub resolution: Option<Resolution>,
    pub issue_type: Option<IssueType>,
    pub severity: Option<Severity>,
    /// `Some(None)` means the window unassigned the issue.
    pub assignee: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

/// The decisive entry and the triage entries right before it.
pub fn triage_window(record: &IssueRecord) -> &[TransitionEvent] {
    let changelog = record.changelog();
    let Some(end) = decisive_index(record) else {
        return &[];
    };

    let mut start = end;
    while start > 0 {
        let prev = &changelog[start - 1];
        if prev.actor.is_system() || prev.touches_lifecycle() {
            break;
        }
        start -= 1;
    }
    &changelog[start..=end]
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replay the triage window of `record`.
pub fn replayed_state(record: &IssueRecord) -> TriageState {
    let mut state = TriageState::default();
    let window = triage_window(record);

    for entry in window {
        for diff in &entry.diffs {
            let value = diff.new_value.as_deref().filter(|v| !v.trim().is_empty());
            match &diff.key {
                FieldKey::Type => match value.map(str::parse::<IssueType>) {
                    Some(Ok(t)) => state.issue_type = Some(t),
                    _ => tracing::debug!("{}: ignoring type change {:?}", record.key(), value),
                },
                FieldKey::Severity => match value.map(str::parse::<Severity>) {
                    Some(Ok(s)) => state.severity = Some(s),
                    _ => tracing::debug!("{}: ignoring severity change {:?}", record.key(), value),
                },
                FieldKey::Assignee => state.assignee = Some(value.map(str::to_string)),
                FieldKey::Tags => state.tags = Some(value.map(split_tags).unwrap_or_default()),
                _ => {}
            }
        }
    }

    if let Some(decisive) = window.last() {
        state.resolution = decisive
            .diff(&FieldKey::Resolution)
            .and_then(|d| d.new_value.as_deref())
            .and_then(|v| v.parse().ok());
    }

    state
}

/// Compute the change set that brings `destination` in line with the
/// triage decision recorded on `source`.
///
/// The assignee is taken as recorded; `apply_changelog` maps it to a login
/// first.
pub fn plan_changes(
    source: &IssueRecord,
    destination: &IssueSummary,
    recover: &RecoverySet,
) -> ChangeSet {
    plan_from_state(source, &replayed_state(source), destination, recover)
}

fn plan_from_state(
    source: &IssueRecord,
    state: &TriageState,
    destination: &IssueSummary,
    recover: &RecoverySet,
) -> ChangeSet {
    let mut changes = Vec::new();

    if recover.contains(TriageAttribute::Type) {
        if let Some(to) = state.issue_type.filter(|t| destination.issue_type != Some(*t)) {
            changes.push(AttributeChange::Type {
                from: destination.issue_type,
                to,
            });
        }
    }

    if recover.contains(TriageAttribute::Severity) {
        if let Some(to) = state.severity.filter(|s| destination.severity != Some(*s)) {
            changes.push(AttributeChange::Severity {
                from: destination.severity,
                to,
            });
        }
    }

    if recover.contains(TriageAttribute::Assignee) {
        if let Some(to) = state.assignee.clone().filter(|a| destination.assignee != *a) {
            changes.push(AttributeChange::Assignee {
                from: destination.assignee.clone(),
                to,
            });
        }
    }

    if recover.contains(TriageAttribute::Tags) {
        if let Some(to) = &state.tags {
            let wanted: BTreeSet<&str> = to.iter().map(String::as_str).collect();
            if wanted != destination.tag_set() {
                changes.push(AttributeChange::Tags {
                    from: destination.tags.clone(),
                    to: wanted.into_iter().map(str::to_string).collect(),
                });
            }
        }
    }

    if recover.contains(TriageAttribute::Comments) {
        let mut seen = BTreeSet::new();
        for comment in &source.summary.comments {
            let text = comment.text.trim();
            if comment.is_recovery_note() || destination.has_comment(text) || !seen.insert(text) {
                continue;
            }
            changes.push(AttributeChange::Comment {
                author: comment.author.clone(),
                text: comment.text.clone(),
            });
        }
    }

    // Resolution goes last: it moves the destination to RESOLVED.
    if recover.contains(TriageAttribute::Resolution) {
        if let Some(to) = state.resolution.filter(|r| destination.resolution != Some(*r)) {
            changes.push(AttributeChange::Resolution {
                from: destination.resolution,
                to,
            });
        }
    }

    ChangeSet {
        source: source.key().clone(),
        destination: destination.key.clone(),
        changes,
    }
}

/// Transplant the triage decision of `source` onto `destination`.
///
/// # Errors
///
/// - `DestinationClosed` if `destination` is closed
/// - `NotMistaken` if `source` is not a mistaken closure
///
/// Tracker failures are not errors here; they come back as
/// `ReplayOutcome::Failed`.
pub async fn apply_changelog(
    tracker: &dyn IssueTracker,
    source: &IssueRecord,
    destination: &IssueSummary,
    recover: &RecoverySet,
    dry_run: bool,
) -> Result<ReplayOutcome, ReplayError> {
    if destination.status.is_closed() {
        return Err(ReplayError::DestinationClosed(destination.key.clone()));
    }
    let verdict = classify(source);
    if !verdict.is_mistaken() {
        return Err(ReplayError::NotMistaken {
            key: source.key().clone(),
            verdict,
        });
    }

    let mut state = replayed_state(source);
    if recover.contains(TriageAttribute::Assignee) {
        resolve_assignee(tracker, source.key(), &mut state).await;
    }

    let change_set = plan_from_state(source, &state, destination, recover);
    if change_set.is_empty() {
        tracing::debug!(
            "{} -> {}: already in sync",
            change_set.source,
            change_set.destination
        );
        return Ok(ReplayOutcome::AlreadyInSync);
    }

    if dry_run {
        tracing::info!(
            "{} -> {}: would apply {} change(s)",
            change_set.source,
            change_set.destination,
            change_set.changes.len()
        );
        return Ok(ReplayOutcome::Planned(change_set));
    }

    match tracker
        .apply_transition(&destination.key, &change_set)
        .await
    {
        Ok(()) => {
            tracing::info!(
                "{} -> {}: applied {} change(s)",
                change_set.source,
                change_set.destination,
                change_set.changes.len()
            );
            Ok(ReplayOutcome::Applied(change_set))
        }
        Err(failure) => {
            tracing::warn!(
                "{} -> {}: write failed with {} change(s) left applied: {}",
                change_set.source,
                change_set.destination,
                failure.applied.len(),
                failure.error
            );
            Ok(ReplayOutcome::Failed {
                change_set,
                applied: failure.applied,
                error: failure.error,
            })
        }
    }
}

/// Map the replayed assignee from a display name to a login.
///
/// A name that maps to no single user drops the attribute.
async fn resolve_assignee(tracker: &dyn IssueTracker, source: &IssueKey, state: &mut TriageState) {
    let Some(Some(name)) = state.assignee.clone() else {
        return;
    };
    match tracker.resolve_login(&name).await {
        Ok(Some(login)) => state.assignee = Some(Some(login)),
        Ok(None) => {
            tracing::warn!(
                "{}: no single user named '{}', assignee not recovered",
                source,
                name
            );
            state.assignee = None;
        }
        Err(e) => {
            tracing::warn!(
                "{}: could not look up user '{}', assignee not recovered: {}",
                source,
                name,
                e
            );
            state.assignee = None;
        }
    }
}
