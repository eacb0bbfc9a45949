//! engine::intake
//!
//! Validate raw search results into issue summaries.
//!
//! Malformed records are skipped with a warning and counted; they never
//! abort a run. Duplicate keys (possible when issues move between pages
//! during a long search) keep their first occurrence.

use std::collections::HashSet;

use crate::core::types::{IssueKey, IssueSummary, RawIssue};

/// Validated issues plus the number of records dropped.
#[derive(Debug, Default)]
pub struct Intake {
    pub issues: Vec<IssueSummary>,
    pub malformed: usize,
}

/// Convert `raw` records. `set` names the search in log output.
pub fn intake(raw: Vec<RawIssue>, set: &str) -> Intake {
    let mut seen: HashSet<IssueKey> = HashSet::new();
    let mut result = Intake::default();

    for record in raw {
        let key = record.key.clone().unwrap_or_else(|| "<no key>".to_string());
        match IssueSummary::try_from(record) {
            Ok(summary) => {
                if seen.insert(summary.key.clone()) {
                    result.issues.push(summary);
                } else {
                    tracing::debug!("{} set: duplicate issue {} ignored", set, summary.key);
                }
            }
            Err(e) => {
                tracing::warn!("{} set: skipping malformed issue {}: {}", set, key, e);
                result.malformed += 1;
            }
        }
    }

    tracing::debug!(
        "{} set: {} issues accepted, {} malformed",
        set,
        result.issues.len(),
        result.malformed
    );
    result
}
