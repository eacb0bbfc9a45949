//! engine::report
//!
//! Recovery report: one entry per closed issue examined.
//!
//! The report is plain data, serializable to JSON. Human rendering lives in
//! `ui::output`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classify::Verdict;
use crate::core::types::{AttributeChange, IssueKey};

/// What happened to one closed issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Closure was not a mistaken one.
    NotEligible,
    /// Mistaken closure with no open sibling.
    Orphaned,
    /// Unique sibling already carries the triage.
    AlreadyInSync,
    /// Dry run: changes computed, nothing written.
    Planned,
    /// Changes written to the unique sibling.
    Applied,
    /// Several siblings, or a sibling contended by another closed issue.
    Ambiguous,
    /// History read or write failed.
    Failed,
    /// Not processed because the run was cancelled.
    Cancelled,
}

impl Action {
    pub const ALL: &'static [Action] = &[
        Action::NotEligible,
        Action::Orphaned,
        Action::AlreadyInSync,
        Action::Planned,
        Action::Applied,
        Action::Ambiguous,
        Action::Failed,
        Action::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NotEligible => "not-eligible",
            Action::Orphaned => "orphaned",
            Action::AlreadyInSync => "in-sync",
            Action::Planned => "planned",
            Action::Applied => "applied",
            Action::Ambiguous => "ambiguous",
            Action::Failed => "failed",
            Action::Cancelled => "cancelled",
        }
    }

    /// Whether a person has to look at this entry.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Action::Ambiguous | Action::Failed)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report line for one closed issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub closed: IssueKey,
    /// Fingerprint digest of the closed issue
    pub fingerprint: String,
    pub verdict: Verdict,
    /// Matched siblings, best first
    pub candidates: Vec<IssueKey>,
    pub action: Action,
    pub destination: Option<IssueKey>,
    /// Planned or applied changes
    pub changes: Vec<AttributeChange>,
    /// Changes written and still on the destination
    #[serde(default)]
    pub applied: Vec<AttributeChange>,
    pub error: Option<String>,
}

impl ReportEntry {
    pub fn new(closed: IssueKey, fingerprint: String, verdict: Verdict, action: Action) -> Self {
        Self {
            closed,
            fingerprint,
            verdict,
            candidates: Vec::new(),
            action,
            destination: None,
            changes: Vec::new(),
            applied: Vec::new(),
            error: None,
        }
    }
}

/// Per-action counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub examined: usize,
    pub mistaken: usize,
    pub not_eligible: usize,
    pub orphaned: usize,
    pub in_sync: usize,
    pub planned: usize,
    pub applied: usize,
    pub ambiguous: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl ReportSummary {
    pub fn count(&self, action: Action) -> usize {
        match action {
            Action::NotEligible => self.not_eligible,
            Action::Orphaned => self.orphaned,
            Action::AlreadyInSync => self.in_sync,
            Action::Planned => self.planned,
            Action::Applied => self.applied,
            Action::Ambiguous => self.ambiguous,
            Action::Failed => self.failed,
            Action::Cancelled => self.cancelled,
        }
    }

    fn slot(&mut self, action: Action) -> &mut usize {
        match action {
            Action::NotEligible => &mut self.not_eligible,
            Action::Orphaned => &mut self.orphaned,
            Action::AlreadyInSync => &mut self.in_sync,
            Action::Planned => &mut self.planned,
            Action::Applied => &mut self.applied,
            Action::Ambiguous => &mut self.ambiguous,
            Action::Failed => &mut self.failed,
            Action::Cancelled => &mut self.cancelled,
        }
    }
}

/// Outcome of one recovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub closed_total: usize,
    pub candidates_total: usize,
    pub malformed_skipped: usize,
    pub entries: Vec<ReportEntry>,
}

impl RecoveryReport {
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            examined: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            *summary.slot(entry.action) += 1;
            if entry.verdict.is_mistaken() {
                summary.mistaken += 1;
            }
        }
        summary
    }

    /// Entries with the given action.
    pub fn entries_with(&self, action: Action) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.action == action)
    }

    /// Entry for a closed issue.
    pub fn entry(&self, closed: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.closed.as_str() == closed)
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.action == Action::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, verdict: Verdict, action: Action) -> ReportEntry {
        ReportEntry::new(
            IssueKey::new(key).unwrap(),
            "sha256:00".into(),
            verdict,
            action,
        )
    }

    fn report(entries: Vec<ReportEntry>) -> RecoveryReport {
        let now = Utc::now();
        RecoveryReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            dry_run: true,
            closed_total: entries.len(),
            candidates_total: 0,
            malformed_skipped: 0,
            entries,
        }
    }

    #[test]
    fn summary_counts() {
        let r = report(vec![
            entry("A", Verdict::FalsePositive, Action::Planned),
            entry("B", Verdict::WontFix, Action::Ambiguous),
            entry("C", Verdict::Fixed, Action::NotEligible),
            entry("D", Verdict::FalsePositive, Action::Planned),
        ]);
        let s = r.summary();
        assert_eq!(s.examined, 4);
        assert_eq!(s.mistaken, 3);
        assert_eq!(s.count(Action::Planned), 2);
        assert_eq!(s.count(Action::Ambiguous), 1);
        assert_eq!(s.count(Action::NotEligible), 1);
        assert_eq!(s.count(Action::Applied), 0);
        assert!(!r.has_failures());
    }

    #[test]
    fn lookup_and_filter() {
        let r = report(vec![
            entry("A", Verdict::FalsePositive, Action::Failed),
            entry("B", Verdict::NoTriage, Action::NotEligible),
        ]);
        assert!(r.has_failures());
        assert_eq!(r.entries_with(Action::Failed).count(), 1);
        assert_eq!(r.entry("B").unwrap().verdict, Verdict::NoTriage);
        assert!(r.entry("Z").is_none());
    }

    #[test]
    fn serializes_to_json() {
        let r = report(vec![entry("A", Verdict::WontFix, Action::AlreadyInSync)]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["entries"][0]["action"], "already_in_sync");
        assert_eq!(json["entries"][0]["verdict"], "wont_fix");
        assert_eq!(json["entries"][0]["closed"], "A");
    }

    #[test]
    fn attention_actions() {
        assert!(Action::Ambiguous.needs_attention());
        assert!(Action::Failed.needs_attention());
        assert!(!Action::Applied.needs_attention());
    }
}
