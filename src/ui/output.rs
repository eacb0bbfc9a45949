//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag.
//! When `--json` is enabled, the report is printed as machine-readable JSON.
//! Diagnostics go to stderr through `tracing`; only results go to stdout.

use std::fmt::{Display, Write};

use crate::engine::{Action, RecoveryReport, ReportEntry};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    /// Default `tracing` level directive for this verbosity.
    pub fn log_level(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Format a list of items.
pub fn format_list<T: Display>(items: &[T], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_entry(out: &mut String, entry: &ReportEntry) {
    let _ = write!(
        out,
        "  {:<24} {:<15} {:<10}",
        entry.closed.as_str(),
        entry.verdict.as_str(),
        entry.action.as_str()
    );
    match entry.action {
        Action::Ambiguous => {
            let keys: Vec<&str> = entry.candidates.iter().map(|k| k.as_str()).collect();
            let _ = write!(out, " candidates: {}", keys.join(", "));
        }
        _ => {
            if let Some(dest) = &entry.destination {
                let _ = write!(out, " -> {}", dest);
            }
        }
    }
    out.push('\n');

    if entry.action == Action::Failed && !entry.changes.is_empty() {
        // A failed write can leave part of the change set behind.
        for change in &entry.changes {
            let state = if entry.applied.contains(change) {
                "applied"
            } else {
                "not applied"
            };
            let _ = writeln!(out, "      {} ({})", change, state);
        }
    } else if !entry.changes.is_empty() {
        out.push_str(&format_list(&entry.changes, "      "));
        out.push('\n');
    }
    if let Some(error) = &entry.error {
        let _ = writeln!(out, "      {}", error);
    }
}

/// Render a report for a terminal.
///
/// Entries that were not eligible only show up in the summary line.
pub fn render_report(report: &RecoveryReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { "dry run" } else { "applied" };
    let _ = writeln!(out, "Recovery run {} ({})", report.run_id, mode);
    let _ = writeln!(
        out,
        "Closed issues: {}, candidates: {}, malformed skipped: {}",
        report.closed_total, report.candidates_total, report.malformed_skipped
    );

    let shown: Vec<&ReportEntry> = report
        .entries
        .iter()
        .filter(|e| e.action != Action::NotEligible)
        .collect();
    if !shown.is_empty() {
        out.push('\n');
        for entry in shown {
            render_entry(&mut out, entry);
        }
    }

    let summary = report.summary();
    let counts: Vec<String> = Action::ALL
        .iter()
        .filter(|a| summary.count(**a) > 0)
        .map(|a| format!("{} {}", summary.count(*a), a))
        .collect();
    out.push('\n');
    if counts.is_empty() {
        out.push_str("Summary: no closed issues examined\n");
    } else {
        let _ = writeln!(out, "Summary: {}", counts.join(", "));
    }
    if report.dry_run && summary.planned > 0 {
        out.push_str("Re-run with --apply to write the planned changes.\n");
    }
    out
}

/// Render a report as pretty JSON.
pub fn render_report_json(report: &RecoveryReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttributeChange, IssueKey, Resolution, Severity};
    use crate::engine::Verdict;
    use chrono::Utc;
    use uuid::Uuid;

    fn key(k: &str) -> IssueKey {
        IssueKey::new(k).unwrap()
    }

    fn report(dry_run: bool) -> RecoveryReport {
        let mut planned = ReportEntry::new(
            key("AX-1"),
            "sha256:aa".into(),
            Verdict::FalsePositive,
            Action::Planned,
        );
        planned.destination = Some(key("AX-9"));
        planned.changes = vec![AttributeChange::Resolution {
            from: None,
            to: Resolution::FalsePositive,
        }];

        let mut ambiguous = ReportEntry::new(
            key("AX-2"),
            "sha256:bb".into(),
            Verdict::WontFix,
            Action::Ambiguous,
        );
        ambiguous.candidates = vec![key("AX-3"), key("AX-4")];

        let skipped = ReportEntry::new(
            key("AX-5"),
            "sha256:cc".into(),
            Verdict::Fixed,
            Action::NotEligible,
        );

        let now = Utc::now();
        RecoveryReport {
            run_id: Uuid::nil(),
            started_at: now,
            finished_at: now,
            dry_run,
            closed_total: 3,
            candidates_total: 4,
            malformed_skipped: 1,
            entries: vec![planned, ambiguous, skipped],
        }
    }

    #[test]
    fn verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::Normal.log_level(), "info");
    }

    #[test]
    fn format_list_prefixes() {
        assert_eq!(format_list(&["a", "b"], "- "), "- a\n- b");
    }

    #[test]
    fn human_report() {
        let text = render_report(&report(true));
        assert!(text.contains("(dry run)"));
        assert!(text.contains("malformed skipped: 1"));
        assert!(text.contains("-> AX-9"));
        assert!(text.contains("resolution: - -> FALSE-POSITIVE"));
        assert!(text.contains("candidates: AX-3, AX-4"));
        assert!(!text.contains("AX-5"));
        assert!(text.contains("Summary: 1 not-eligible, 1 planned, 1 ambiguous"));
        assert!(text.contains("--apply"));
    }

    #[test]
    fn applied_report_has_no_hint() {
        let text = render_report(&report(false));
        assert!(text.contains("(applied)"));
        assert!(!text.contains("--apply"));
    }

    #[test]
    fn failed_write_shows_what_landed() {
        let severity = AttributeChange::Severity {
            from: None,
            to: Severity::Minor,
        };
        let resolution = AttributeChange::Resolution {
            from: None,
            to: Resolution::FalsePositive,
        };
        let mut failed = ReportEntry::new(
            key("AX-6"),
            "sha256:dd".into(),
            Verdict::FalsePositive,
            Action::Failed,
        );
        failed.destination = Some(key("AX-7"));
        failed.changes = vec![severity.clone(), resolution];
        failed.applied = vec![severity];
        failed.error = Some("permission denied".into());

        let mut out = String::new();
        render_entry(&mut out, &failed);
        assert!(out.contains("severity: - -> MINOR (applied)"));
        assert!(out.contains("resolution: - -> FALSE-POSITIVE (not applied)"));
    }

    #[test]
    fn json_report() {
        let json = render_report_json(&report(true)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"].as_array().unwrap().len(), 3);
        assert_eq!(value["dry_run"], true);
    }
}
