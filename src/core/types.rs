//! core::types
//!
//! Strong types for the issue-tracking domain.
//!
//! # Types
//!
//! - [`IssueKey`] - Validated, opaque issue identifier
//! - [`Status`], [`Resolution`], [`IssueType`], [`Severity`] - Closed vocabularies
//! - [`RawIssue`] - Untrusted issue payload as returned by a tracker search
//! - [`IssueSummary`] - Validated search result without history
//! - [`IssueRecord`] - Summary upgraded with its changelog
//! - [`TransitionEvent`] / [`FieldDiff`] - One changelog entry and its field changes
//! - [`AttributeChange`] / [`ChangeSet`] - Attribute writes computed by replay
//!
//! # Validation
//!
//! A [`RawIssue`] carries every field as optional. Converting it into an
//! [`IssueSummary`] is where malformed records are rejected, so nothing past
//! intake ever sees a record without a key, rule, component, message or status.
//!
//! # Examples
//!
//! ```
//! use triage_recover::core::types::{IssueKey, Resolution, Status};
//!
//! let key = IssueKey::new("AYx-1").unwrap();
//! assert_eq!(key.as_str(), "AYx-1");
//! assert!(IssueKey::new("  ").is_err());
//!
//! assert_eq!("WONTFIX".parse::<Resolution>().unwrap(), Resolution::WontFix);
//! assert!(Status::Closed.is_closed());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid issue key: {0}")]
    InvalidKey(String),

    #[error("unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("resolution '{resolution}' set on issue with status '{status}'")]
    ResolutionWithoutResolvedStatus { resolution: String, status: String },
}

/// An opaque issue identifier.
///
/// Keys are only meaningful within one issue lineage; the same logical defect
/// resurfaces under a different key after a close/reopen cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueKey(String);

impl IssueKey {
    /// Create a new issue key.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidKey` if the key is empty or contains whitespace.
    pub fn new(key: impl Into<String>) -> Result<Self, TypeError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(TypeError::InvalidKey("issue key cannot be empty".into()));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidKey(format!(
                "issue key '{}' contains whitespace",
                key
            )));
        }
        Ok(Self(key))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IssueKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IssueKey> for String {
    fn from(key: IssueKey) -> Self {
        key.0
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declares a closed string vocabulary with `as_str`, `FromStr`, `Display`
/// and string-based serde.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every value of this vocabulary, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The wire representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(TypeError::UnknownValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Issue workflow status.
    Status, "status" {
        Open => "OPEN",
        Confirmed => "CONFIRMED",
        Reopened => "REOPENED",
        Resolved => "RESOLVED",
        Closed => "CLOSED",
    }
}

impl Status {
    /// Statuses that make up the candidate pool.
    pub const NON_CLOSED: &'static [Status] = &[
        Status::Open,
        Status::Confirmed,
        Status::Reopened,
        Status::Resolved,
    ];

    /// Whether the issue is closed (immutable going forward).
    pub fn is_closed(&self) -> bool {
        matches!(self, Status::Closed)
    }

    /// Whether a resolution may be set in this status.
    pub fn allows_resolution(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }
}

vocabulary! {
    /// Issue resolution.
    Resolution, "resolution" {
        FalsePositive => "FALSE-POSITIVE",
        WontFix => "WONTFIX",
        Fixed => "FIXED",
        Removed => "REMOVED",
    }
}

vocabulary! {
    /// Issue type.
    IssueType, "issue type" {
        Bug => "BUG",
        Vulnerability => "VULNERABILITY",
        CodeSmell => "CODE_SMELL",
        SecurityHotspot => "SECURITY_HOTSPOT",
    }
}

vocabulary! {
    /// Issue severity.
    Severity, "severity" {
        Blocker => "BLOCKER",
        Critical => "CRITICAL",
        Major => "MAJOR",
        Minor => "MINOR",
        Info => "INFO",
    }
}

/// Who made a changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// The platform itself (scan-driven transitions).
    System,
    /// A human user.
    User { login: String },
    /// An automated agent replaying triage decisions.
    Automation { agent: String },
}

impl Actor {
    /// Whether the entry was generated by the platform rather than a person
    /// or an agent acting on a person's behalf.
    pub fn is_system(&self) -> bool {
        matches!(self, Actor::System)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => f.write_str("system"),
            Actor::User { login } => f.write_str(login),
            Actor::Automation { agent } => write!(f, "{} (automated)", agent),
        }
    }
}

/// Field touched by a changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Status,
    Resolution,
    Type,
    Severity,
    Assignee,
    Tags,
    /// Any field this tool does not reason about (effort, line, file...).
    Other(String),
}

impl FieldKey {
    /// Map a tracker diff key to a field.
    pub fn from_wire(key: &str) -> Self {
        match key {
            "status" => FieldKey::Status,
            "resolution" => FieldKey::Resolution,
            "type" => FieldKey::Type,
            "severity" => FieldKey::Severity,
            "assignee" => FieldKey::Assignee,
            "tags" => FieldKey::Tags,
            other => FieldKey::Other(other.to_string()),
        }
    }

    /// Whether the field is part of an issue's triage state.
    pub fn is_triage(&self) -> bool {
        !matches!(self, FieldKey::Other(_))
    }
}

/// One field change inside a changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub key: FieldKey,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl FieldDiff {
    pub fn new(key: FieldKey, old_value: Option<&str>, new_value: Option<&str>) -> Self {
        Self {
            key,
            old_value: old_value.map(str::to_string),
            new_value: new_value.map(str::to_string),
        }
    }
}

/// One changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub at: DateTime<Utc>,
    pub actor: Actor,
    pub diffs: Vec<FieldDiff>,
}

impl TransitionEvent {
    /// Find the diff for a field, if this entry touched it.
    pub fn diff(&self, key: &FieldKey) -> Option<&FieldDiff> {
        self.diffs.iter().find(|d| &d.key == key)
    }

    /// Whether this entry changed the resolution.
    pub fn touches_resolution(&self) -> bool {
        self.diff(&FieldKey::Resolution).is_some()
    }

    /// Whether this entry changed the status or the resolution.
    pub fn touches_lifecycle(&self) -> bool {
        self.touches_resolution() || self.diff(&FieldKey::Status).is_some()
    }

    /// Whether every diff in this entry is a non-triage field.
    pub fn is_technical(&self) -> bool {
        !self.diffs.iter().any(|d| d.key.is_triage())
    }
}

/// Untrusted issue payload, exactly as a tracker search returned it.
///
/// Field names follow the SonarQube `api/issues/search` JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIssue {
    pub key: Option<String>,
    pub rule: Option<String>,
    pub component: Option<String>,
    pub project: Option<String>,
    pub line: Option<u32>,
    pub message: Option<String>,
    pub status: Option<String>,
    pub resolution: Option<String>,
    #[serde(rename = "type")]
    pub issue_type: Option<String>,
    pub severity: Option<String>,
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub creation_date: Option<String>,
    pub update_date: Option<String>,
    /// Present when the search asked for `additionalFields=comments`.
    #[serde(default)]
    pub comments: Vec<RawComment>,
}

/// Untrusted comment payload attached to a [`RawIssue`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawComment {
    pub key: Option<String>,
    pub login: Option<String>,
    pub markdown: Option<String>,
    pub html_text: Option<String>,
    pub created_at: Option<String>,
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub author: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl IssueComment {
    /// Whether this comment is a marker left by a previous recovery.
    pub fn is_recovery_note(&self) -> bool {
        self.text.starts_with(&format!("[{}]", RECOVERY_AGENT))
    }

    fn from_raw(raw: RawComment) -> Option<Self> {
        let text = raw
            .markdown
            .or(raw.html_text)
            .filter(|t| !t.trim().is_empty())?;
        Some(Self {
            author: raw.login.filter(|l| !l.is_empty()),
            text,
            created_at: raw.created_at.as_deref().and_then(parse_timestamp),
        })
    }
}

/// Validated search result. Carries no history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub key: IssueKey,
    pub rule: String,
    pub component: String,
    pub project: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub status: Status,
    pub resolution: Option<Resolution>,
    pub issue_type: Option<IssueType>,
    pub severity: Option<Severity>,
    pub assignee: Option<String>,
    pub tags: Vec<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub update_date: Option<DateTime<Utc>>,
    /// Oldest first.
    pub comments: Vec<IssueComment>,
}

impl IssueSummary {
    /// Minimal summary with the five required fields; everything else unset.
    pub fn new(
        key: IssueKey,
        rule: impl Into<String>,
        component: impl Into<String>,
        message: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            key,
            rule: rule.into(),
            component: component.into(),
            project: None,
            line: None,
            message: message.into(),
            status,
            resolution: None,
            issue_type: None,
            severity: None,
            assignee: None,
            tags: Vec::new(),
            creation_date: None,
            update_date: None,
            comments: Vec::new(),
        }
    }

    /// Tags as a sorted set, for order-insensitive comparison.
    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.tags.iter().map(String::as_str).collect()
    }

    /// Whether a comment with this text is already on the issue.
    pub fn has_comment(&self, text: &str) -> bool {
        self.comments.iter().any(|c| c.text.trim() == text.trim())
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, TypeError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(TypeError::MissingField(field)),
    }
}

fn optional<T: FromStr<Err = TypeError>>(value: Option<String>) -> Result<Option<T>, TypeError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse())
        .transpose()
}

/// Parse a tracker timestamp (`2023-01-31T10:00:00+0000` or RFC 3339).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl TryFrom<RawIssue> for IssueSummary {
    type Error = TypeError;

    fn try_from(raw: RawIssue) -> Result<Self, Self::Error> {
        let key = IssueKey::new(required(raw.key, "key")?)?;
        let rule = required(raw.rule, "rule")?;
        let component = required(raw.component, "component")?;
        let message = required(raw.message, "message")?;
        let status: Status = required(raw.status, "status")?.parse()?;
        let resolution: Option<Resolution> = optional(raw.resolution)?;

        if let Some(resolution) = resolution {
            if !status.allows_resolution() {
                return Err(TypeError::ResolutionWithoutResolvedStatus {
                    resolution: resolution.to_string(),
                    status: status.to_string(),
                });
            }
        }

        Ok(Self {
            key,
            rule,
            component,
            project: raw.project,
            line: raw.line,
            message,
            status,
            resolution,
            issue_type: optional(raw.issue_type)?,
            severity: optional(raw.severity)?,
            assignee: raw.assignee.filter(|a| !a.is_empty()),
            tags: raw.tags,
            creation_date: raw.creation_date.as_deref().and_then(parse_timestamp),
            update_date: raw.update_date.as_deref().and_then(parse_timestamp),
            comments: {
                let mut comments: Vec<IssueComment> = raw
                    .comments
                    .into_iter()
                    .filter_map(IssueComment::from_raw)
                    .collect();
                comments.sort_by_key(|c| c.created_at);
                comments
            },
        })
    }
}

impl From<&IssueSummary> for RawIssue {
    fn from(summary: &IssueSummary) -> Self {
        let stamp = |dt: &DateTime<Utc>| dt.format("%Y-%m-%dT%H:%M:%S%z").to_string();
        Self {
            key: Some(summary.key.to_string()),
            rule: Some(summary.rule.clone()),
            component: Some(summary.component.clone()),
            project: summary.project.clone(),
            line: summary.line,
            message: Some(summary.message.clone()),
            status: Some(summary.status.to_string()),
            resolution: summary.resolution.map(|r| r.to_string()),
            issue_type: summary.issue_type.map(|t| t.to_string()),
            severity: summary.severity.map(|s| s.to_string()),
            assignee: summary.assignee.clone(),
            tags: summary.tags.clone(),
            creation_date: summary.creation_date.as_ref().map(stamp),
            update_date: summary.update_date.as_ref().map(stamp),
            comments: summary
                .comments
                .iter()
                .map(|c| RawComment {
                    key: None,
                    login: c.author.clone(),
                    markdown: Some(c.text.clone()),
                    html_text: None,
                    created_at: c.created_at.as_ref().map(stamp),
                })
                .collect(),
        }
    }
}

/// A summary upgraded with its full changelog.
///
/// Built only for issues whose history is actually needed; the changelog is
/// sorted chronologically on construction (stable, so same-instant entries
/// keep tracker order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub summary: IssueSummary,
    changelog: Vec<TransitionEvent>,
}

/// Mismatch between an issue's current state and its replayed changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyDrift {
    pub field: FieldKey,
    pub current: Option<String>,
    pub replayed: Option<String>,
}

impl IssueRecord {
    /// Upgrade a summary with its changelog.
    pub fn hydrate(summary: IssueSummary, mut changelog: Vec<TransitionEvent>) -> Self {
        changelog.sort_by_key(|e| e.at);
        Self { summary, changelog }
    }

    pub fn key(&self) -> &IssueKey {
        &self.summary.key
    }

    pub fn status(&self) -> Status {
        self.summary.status
    }

    /// The changelog, oldest first.
    pub fn changelog(&self) -> &[TransitionEvent] {
        &self.changelog
    }

    /// Compare current status/resolution with the last values the changelog set.
    ///
    /// Fields the changelog never touched are not checked: their value comes
    /// from the implicit initial state.
    pub fn check_consistency(&self) -> Vec<ConsistencyDrift> {
        let last_value = |key: &FieldKey| {
            self.changelog
                .iter()
                .rev()
                .find_map(|e| e.diff(key))
                .map(|d| d.new_value.clone())
        };

        let mut drift = Vec::new();

        if let Some(replayed) = last_value(&FieldKey::Status) {
            let current = Some(self.summary.status.to_string());
            if replayed.as_deref().map(str::to_ascii_uppercase) != current {
                drift.push(ConsistencyDrift {
                    field: FieldKey::Status,
                    current,
                    replayed,
                });
            }
        }

        if let Some(replayed) = last_value(&FieldKey::Resolution) {
            let current = self.summary.resolution.map(|r| r.to_string());
            let replayed_norm = replayed.as_deref().filter(|v| !v.is_empty());
            if replayed_norm != current.as_deref() {
                drift.push(ConsistencyDrift {
                    field: FieldKey::Resolution,
                    current,
                    replayed,
                });
            }
        }

        drift
    }
}

/// Triage attribute that replay can carry forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageAttribute {
    Resolution,
    Type,
    Severity,
    Assignee,
    Tags,
    Comments,
}

impl TriageAttribute {
    pub const ALL: &'static [TriageAttribute] = &[
        TriageAttribute::Resolution,
        TriageAttribute::Type,
        TriageAttribute::Severity,
        TriageAttribute::Assignee,
        TriageAttribute::Tags,
        TriageAttribute::Comments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageAttribute::Resolution => "resolution",
            TriageAttribute::Type => "type",
            TriageAttribute::Severity => "severity",
            TriageAttribute::Assignee => "assignee",
            TriageAttribute::Tags => "tags",
            TriageAttribute::Comments => "comments",
        }
    }
}

impl FromStr for TriageAttribute {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resolution" | "fp" | "wf" => Ok(TriageAttribute::Resolution),
            "type" => Ok(TriageAttribute::Type),
            "severity" => Ok(TriageAttribute::Severity),
            "assignee" | "assignment" => Ok(TriageAttribute::Assignee),
            "tags" | "tag" => Ok(TriageAttribute::Tags),
            "comments" | "comment" => Ok(TriageAttribute::Comments),
            _ => Err(TypeError::UnknownValue {
                kind: "triage attribute",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TriageAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attribute write on a destination issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "attribute", rename_all = "snake_case")]
pub enum AttributeChange {
    Resolution {
        from: Option<Resolution>,
        to: Resolution,
    },
    Type {
        from: Option<IssueType>,
        to: IssueType,
    },
    Severity {
        from: Option<Severity>,
        to: Severity,
    },
    Assignee {
        from: Option<String>,
        to: Option<String>,
    },
    Tags {
        from: Vec<String>,
        to: Vec<String>,
    },
    /// A source comment copied verbatim.
    Comment {
        author: Option<String>,
        text: String,
    },
}

impl AttributeChange {
    pub fn attribute(&self) -> TriageAttribute {
        match self {
            AttributeChange::Resolution { .. } => TriageAttribute::Resolution,
            AttributeChange::Type { .. } => TriageAttribute::Type,
            AttributeChange::Severity { .. } => TriageAttribute::Severity,
            AttributeChange::Assignee { .. } => TriageAttribute::Assignee,
            AttributeChange::Tags { .. } => TriageAttribute::Tags,
            AttributeChange::Comment { .. } => TriageAttribute::Comments,
        }
    }
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        match self {
            AttributeChange::Resolution { from, to } => {
                write!(f, "resolution: {} -> {}", opt(from), to)
            }
            AttributeChange::Type { from, to } => write!(f, "type: {} -> {}", opt(from), to),
            AttributeChange::Severity { from, to } => {
                write!(f, "severity: {} -> {}", opt(from), to)
            }
            AttributeChange::Assignee { from, to } => {
                write!(f, "assignee: {} -> {}", opt(from), opt(to))
            }
            AttributeChange::Tags { from, to } => {
                write!(f, "tags: [{}] -> [{}]", from.join(", "), to.join(", "))
            }
            AttributeChange::Comment { author, text } => {
                let first_line = text.lines().next().unwrap_or_default();
                write!(f, "comment by {}: {}", opt(author), first_line)
            }
        }
    }
}

/// Agent name recorded on every write this tool performs.
pub const RECOVERY_AGENT: &str = "triage-recover";

/// The full set of attribute writes for one destination.
///
/// Computed completely before anything is written, and applied as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub source: IssueKey,
    pub destination: IssueKey,
    pub changes: Vec<AttributeChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Text attached to the destination so the write is never mistaken for
    /// manual triage.
    pub fn recovery_note(&self) -> String {
        format!(
            "[{}] Triage history automatically recovered from closed issue {}",
            RECOVERY_AGENT, self.source
        )
    }

    /// The actor recorded for this write.
    pub fn actor(&self) -> Actor {
        Actor::Automation {
            agent: RECOVERY_AGENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw() -> RawIssue {
        RawIssue {
            key: Some("AX-1".into()),
            rule: Some("python:S1481".into()),
            component: Some("proj:src/a.py".into()),
            message: Some("Remove the unused local variable \"x\".".into()),
            status: Some("OPEN".into()),
            ..RawIssue::default()
        }
    }

    mod issue_key {
        use super::*;

        #[test]
        fn accepts_opaque_keys() {
            assert!(IssueKey::new("AYx_12-ab").is_ok());
        }

        #[test]
        fn rejects_empty_and_whitespace() {
            assert!(IssueKey::new("").is_err());
            assert!(IssueKey::new("   ").is_err());
            assert!(IssueKey::new("a b").is_err());
        }

        #[test]
        fn serde_validates() {
            let ok: Result<IssueKey, _> = serde_json::from_str("\"AX-1\"");
            assert!(ok.is_ok());
            let bad: Result<IssueKey, _> = serde_json::from_str("\"\"");
            assert!(bad.is_err());
        }
    }

    mod vocabularies {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!("closed".parse::<Status>().unwrap(), Status::Closed);
            assert_eq!(
                "false-positive".parse::<Resolution>().unwrap(),
                Resolution::FalsePositive
            );
            assert_eq!("code_smell".parse::<IssueType>().unwrap(), IssueType::CodeSmell);
        }

        #[test]
        fn unknown_values_are_errors() {
            let err = "LOST".parse::<Status>().unwrap_err();
            assert_eq!(err.to_string(), "unknown status 'LOST'");
        }

        #[test]
        fn display_round_trips_wire_text() {
            for s in Severity::ALL {
                assert_eq!(s.to_string().parse::<Severity>().unwrap(), *s);
            }
        }

        #[test]
        fn non_closed_statuses_exclude_closed() {
            assert!(!Status::NON_CLOSED.contains(&Status::Closed));
            assert_eq!(Status::NON_CLOSED.len(), 4);
        }
    }

    mod summary_from_raw {
        use super::*;

        #[test]
        fn minimal_record_converts() {
            let summary = IssueSummary::try_from(raw()).unwrap();
            assert_eq!(summary.key.as_str(), "AX-1");
            assert_eq!(summary.status, Status::Open);
            assert!(summary.resolution.is_none());
        }

        #[test]
        fn missing_required_field_is_malformed() {
            let mut r = raw();
            r.rule = None;
            assert_eq!(
                IssueSummary::try_from(r).unwrap_err(),
                TypeError::MissingField("rule")
            );

            let mut r = raw();
            r.message = Some("  ".into());
            assert_eq!(
                IssueSummary::try_from(r).unwrap_err(),
                TypeError::MissingField("message")
            );
        }

        #[test]
        fn resolution_on_open_issue_is_malformed() {
            let mut r = raw();
            r.resolution = Some("WONTFIX".into());
            assert!(matches!(
                IssueSummary::try_from(r),
                Err(TypeError::ResolutionWithoutResolvedStatus { .. })
            ));
        }

        #[test]
        fn parses_sonar_timestamps() {
            let mut r = raw();
            r.creation_date = Some("2023-03-01T10:15:00+0100".into());
            let summary = IssueSummary::try_from(r).unwrap();
            assert_eq!(
                summary.creation_date,
                Some(Utc.with_ymd_and_hms(2023, 3, 1, 9, 15, 0).unwrap())
            );
        }

        #[test]
        fn deserializes_search_json() {
            let json = r#"{
                "key": "AX-9", "rule": "java:S1068", "component": "p:A.java",
                "line": 12, "message": "unused", "status": "CLOSED",
                "resolution": "FIXED", "type": "CODE_SMELL", "severity": "MINOR",
                "tags": ["unused"], "effort": "5min"
            }"#;
            let raw: RawIssue = serde_json::from_str(json).unwrap();
            let summary = IssueSummary::try_from(raw).unwrap();
            assert_eq!(summary.line, Some(12));
            assert_eq!(summary.issue_type, Some(IssueType::CodeSmell));
            assert_eq!(summary.resolution, Some(Resolution::Fixed));
        }

        #[test]
        fn back_to_raw_and_again() {
            let mut summary = IssueSummary::try_from(raw()).unwrap();
            summary.severity = Some(Severity::Major);
            summary.tags = vec!["b".into(), "a".into()];
            let again = IssueSummary::try_from(RawIssue::from(&summary)).unwrap();
            assert_eq!(again, summary);
        }
    }

    mod record {
        use super::*;

        fn event(minute: u32, actor: Actor, diffs: Vec<FieldDiff>) -> TransitionEvent {
            TransitionEvent {
                at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
                actor,
                diffs,
            }
        }

        #[test]
        fn hydrate_sorts_chronologically() {
            let summary = IssueSummary::try_from(raw()).unwrap();
            let late = event(5, Actor::System, vec![]);
            let early = event(1, Actor::System, vec![]);
            let record = IssueRecord::hydrate(summary, vec![late.clone(), early.clone()]);
            assert_eq!(record.changelog(), &[early, late]);
        }

        #[test]
        fn consistent_record_has_no_drift() {
            let mut summary = IssueSummary::try_from(raw()).unwrap();
            summary.status = Status::Closed;
            summary.resolution = Some(Resolution::Fixed);
            let record = IssueRecord::hydrate(
                summary,
                vec![event(
                    1,
                    Actor::System,
                    vec![
                        FieldDiff::new(FieldKey::Status, Some("OPEN"), Some("CLOSED")),
                        FieldDiff::new(FieldKey::Resolution, None, Some("FIXED")),
                    ],
                )],
            );
            assert!(record.check_consistency().is_empty());
        }

        #[test]
        fn drift_is_reported() {
            let summary = IssueSummary::try_from(raw()).unwrap();
            let record = IssueRecord::hydrate(
                summary,
                vec![event(
                    1,
                    Actor::System,
                    vec![FieldDiff::new(FieldKey::Status, Some("OPEN"), Some("CLOSED"))],
                )],
            );
            let drift = record.check_consistency();
            assert_eq!(drift.len(), 1);
            assert_eq!(drift[0].field, FieldKey::Status);
        }

        #[test]
        fn technical_events() {
            let e = event(
                1,
                Actor::System,
                vec![FieldDiff::new(FieldKey::from_wire("effort"), Some("5"), Some("10"))],
            );
            assert!(e.is_technical());
            assert!(!e.touches_lifecycle());
        }
    }

    #[test]
    fn triage_attribute_aliases() {
        assert_eq!(
            "assignment".parse::<TriageAttribute>().unwrap(),
            TriageAttribute::Assignee
        );
        assert!("colour".parse::<TriageAttribute>().is_err());
    }

    #[test]
    fn comments_come_from_markdown_oldest_first() {
        let mut r = raw();
        r.comments = vec![
            RawComment {
                login: Some("bob".into()),
                markdown: Some("second".into()),
                created_at: Some("2024-01-02T00:00:00+0000".into()),
                ..RawComment::default()
            },
            RawComment {
                login: Some("alice".into()),
                html_text: Some("first".into()),
                created_at: Some("2024-01-01T00:00:00+0000".into()),
                ..RawComment::default()
            },
            RawComment {
                markdown: Some("   ".into()),
                ..RawComment::default()
            },
        ];
        let summary = IssueSummary::try_from(r).unwrap();
        let texts: Vec<_> = summary.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(summary.has_comment(" second\n"));
        assert!(!summary.has_comment("third"));
    }

    #[test]
    fn recovery_notes_are_recognized() {
        let cs = ChangeSet {
            source: IssueKey::new("C1").unwrap(),
            destination: IssueKey::new("O1").unwrap(),
            changes: vec![],
        };
        let note = IssueComment {
            author: None,
            text: cs.recovery_note(),
            created_at: None,
        };
        assert!(note.is_recovery_note());
    }

    #[test]
    fn change_display() {
        let change = AttributeChange::Resolution {
            from: None,
            to: Resolution::WontFix,
        };
        assert_eq!(change.to_string(), "resolution: - -> WONTFIX");
    }

    #[test]
    fn recovery_note_names_source() {
        let cs = ChangeSet {
            source: IssueKey::new("C1").unwrap(),
            destination: IssueKey::new("O1").unwrap(),
            changes: vec![],
        };
        assert!(cs.recovery_note().contains("C1"));
        assert!(cs.is_empty());
        assert!(matches!(cs.actor(), Actor::Automation { .. }));
    }
}
