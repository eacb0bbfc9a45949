//! core::fingerprint
//!
//! Identifier-independent issue signatures.
//!
//! # Design
//!
//! Issue keys do not survive a close/reopen cycle, so siblings are matched on
//! content: the detection rule, the component and the normalized message.
//! The source line is not part of the signature. It is kept alongside as a
//! secondary criterion for ranking, never for exclusion.
//!
//! # Example
//!
//! ```
//! use triage_recover::core::fingerprint::Fingerprint;
//!
//! let a = Fingerprint::new("R1", "src/a.py", "unused   var x ");
//! let b = Fingerprint::new("R1", "src/a.py", "unused var x");
//! assert_eq!(a, b);
//! assert!(a.digest().starts_with("sha256:"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::{IssueRecord, IssueSummary};

/// Content signature of an issue: (rule, component, normalized message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    rule: String,
    component: String,
    message: String,
}

impl Fingerprint {
    pub fn new(rule: &str, component: &str, message: &str) -> Self {
        Self {
            rule: rule.trim().to_string(),
            component: component.trim().to_string(),
            message: normalize_message(message),
        }
    }

    pub fn of(summary: &IssueSummary) -> Self {
        Self::new(&summary.rule, &summary.component, &summary.message)
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stable digest of the signature, `sha256:<hex>`.
    ///
    /// Fields are NUL-separated so that no two distinct signatures can
    /// concatenate to the same byte string.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.rule.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.component.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.message.as_bytes());
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

impl From<&IssueSummary> for Fingerprint {
    fn from(summary: &IssueSummary) -> Self {
        Self::of(summary)
    }
}

impl From<&IssueRecord> for Fingerprint {
    fn from(record: &IssueRecord) -> Self {
        Self::of(&record.summary)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}: {}", self.rule, self.component, self.message)
    }
}

/// Trim and collapse every whitespace run to a single space.
pub fn normalize_message(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distance between two optional lines. Unknown on either side is `None`.
pub fn line_distance(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.abs_diff(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IssueKey, Status};

    fn summary(key: &str, line: Option<u32>) -> IssueSummary {
        let mut s = IssueSummary::new(
            IssueKey::new(key).unwrap(),
            "R1",
            "src/a.py",
            "unused var x",
            Status::Open,
        );
        s.line = line;
        s
    }

    #[test]
    fn excludes_key_and_line() {
        let a = Fingerprint::of(&summary("A", Some(10)));
        let b = Fingerprint::of(&summary("B", Some(14)));
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn differs_on_rule() {
        let a = Fingerprint::new("R1", "src/a.py", "m");
        let b = Fingerprint::new("R2", "src/a.py", "m");
        assert_ne!(a, b);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_separates_fields() {
        let a = Fingerprint::new("ab", "c", "m");
        let b = Fingerprint::new("a", "bc", "m");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn message_normalization() {
        assert_eq!(normalize_message("  a \t b\n c  "), "a b c");
        assert_eq!(normalize_message(""), "");
    }

    #[test]
    fn message_case_is_significant() {
        assert_ne!(
            Fingerprint::new("R", "c", "Unused x"),
            Fingerprint::new("R", "c", "unused x")
        );
    }

    #[test]
    fn line_distance_cases() {
        assert_eq!(line_distance(Some(10), Some(14)), Some(4));
        assert_eq!(line_distance(Some(14), Some(10)), Some(4));
        assert_eq!(line_distance(None, Some(1)), None);
    }

    #[test]
    fn display() {
        let fp = Fingerprint::new("R1", "src/a.py", "unused var x");
        assert_eq!(fp.to_string(), "R1 @ src/a.py: unused var x");
    }
}
