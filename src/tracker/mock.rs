//! tracker::mock
//!
//! Mock tracker implementation for deterministic testing.
//!
//! # Design
//!
//! The mock tracker stores raw issues, changelogs and users in memory,
//! applies change sets the way a real tracker would (including an automated
//! changelog entry per write), records every call, and allows configuring
//! failure scenarios per operation and per issue. A write can also be made
//! to fail part way, leaving its first changes applied.
//!
//! # Example
//!
//! ```
//! use triage_recover::core::types::RawIssue;
//! use triage_recover::tracker::mock::MockTracker;
//! use triage_recover::tracker::{IssueTracker, SearchFilters};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let tracker = MockTracker::new().with_issue(RawIssue {
//!     key: Some("AX-1".into()),
//!     status: Some("OPEN".into()),
//!     ..RawIssue::default()
//! });
//!
//! let found = tracker
//!     .search(&SearchFilters::candidates(vec![], 500))
//!     .await
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{IssueTracker, SearchFilters, TrackerError, WriteFailure};
use crate::core::types::{
    AttributeChange, ChangeSet, FieldDiff, FieldKey, IssueKey, RawComment, RawIssue, Status,
    TransitionEvent,
};

/// Mock tracker for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTracker {
    inner: Arc<Mutex<MockTrackerInner>>,
}

#[derive(Debug, Default)]
struct MockTrackerInner {
    /// Issues in insertion order (malformed payloads allowed).
    issues: Vec<RawIssue>,
    /// Changelogs by issue key.
    changelogs: HashMap<String, Vec<TransitionEvent>>,
    /// Known users as (login, display name).
    users: Vec<(String, String)>,
    /// Configured failures.
    failures: Vec<Failure>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

#[derive(Debug)]
struct Failure {
    on: FailOn,
    /// Remaining injections; `None` fails forever.
    remaining: Option<u32>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail every search with the given error.
    Search(TrackerError),
    /// Fail searches that include this status.
    SearchStatus(Status, TrackerError),
    /// Fail every changelog fetch with the given error.
    FetchChangelog(TrackerError),
    /// Fail the changelog fetch for one issue.
    FetchChangelogFor(IssueKey, TrackerError),
    /// Fail every write with the given error.
    ApplyTransition(TrackerError),
    /// Fail writes to one issue.
    ApplyTransitionFor(IssueKey, TrackerError),
    /// Apply the first `n` changes of every write, then fail.
    ApplyTransitionAfter(usize, TrackerError),
    /// Fail every login lookup.
    ResolveLogin(TrackerError),
}

impl FailOn {
    fn error_for(&self, op: &MockOperation) -> Option<TrackerError> {
        match (self, op) {
            (FailOn::Search(e), MockOperation::Search { .. }) => Some(e.clone()),
            (FailOn::SearchStatus(status, e), MockOperation::Search { statuses, .. })
                if statuses.contains(status) =>
            {
                Some(e.clone())
            }
            (FailOn::FetchChangelog(e), MockOperation::FetchChangelog { .. }) => Some(e.clone()),
            (FailOn::FetchChangelogFor(k, e), MockOperation::FetchChangelog { key }) if k == key => {
                Some(e.clone())
            }
            (FailOn::ApplyTransition(e), MockOperation::ApplyTransition { .. }) => Some(e.clone()),
            (FailOn::ApplyTransitionFor(k, e), MockOperation::ApplyTransition { key, .. })
                if k == key =>
            {
                Some(e.clone())
            }
            (FailOn::ApplyTransitionAfter(_, e), MockOperation::ApplyTransition { .. }) => {
                Some(e.clone())
            }
            (FailOn::ResolveLogin(e), MockOperation::ResolveLogin { .. }) => Some(e.clone()),
            _ => None,
        }
    }

    /// Changes a failing write still applies.
    fn landed(&self) -> usize {
        match self {
            FailOn::ApplyTransitionAfter(n, _) => *n,
            _ => 0,
        }
    }
}

/// Error injected into one call.
struct Injected {
    error: TrackerError,
    landed: usize,
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOperation {
    Search {
        statuses: Vec<Status>,
        components: Vec<String>,
    },
    FetchChangelog {
        key: IssueKey,
    },
    ResolveLogin {
        name: String,
    },
    ApplyTransition {
        key: IssueKey,
        changes: ChangeSet,
    },
}

impl MockTracker {
    /// Create a new empty mock tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an issue payload.
    pub fn with_issue(self, issue: RawIssue) -> Self {
        self.state().issues.push(issue);
        self
    }

    /// Set the changelog of an issue.
    pub fn with_changelog(self, key: &str, changelog: Vec<TransitionEvent>) -> Self {
        self.state().changelogs.insert(key.to_string(), changelog);
        self
    }

    /// Add a user shown as `name` in changelogs.
    pub fn with_user(self, login: &str, name: &str) -> Self {
        self.state()
            .users
            .push((login.to_string(), name.to_string()));
        self
    }

    /// Configure the mock to fail on an operation, every time.
    ///
    /// # Example
    ///
    /// ```
    /// use triage_recover::tracker::mock::{MockTracker, FailOn};
    /// use triage_recover::tracker::TrackerError;
    ///
    /// let tracker = MockTracker::new()
    ///     .fail_on(FailOn::Search(TrackerError::RateLimited));
    /// ```
    pub fn fail_on(self, on: FailOn) -> Self {
        self.state().failures.push(Failure {
            on,
            remaining: None,
        });
        self
    }

    /// Configure the mock to fail on an operation for the next `times` calls.
    pub fn fail_on_times(self, on: FailOn, times: u32) -> Self {
        self.state().failures.push(Failure {
            on,
            remaining: Some(times),
        });
        self
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state().operations.clone()
    }

    /// Change sets written so far, by destination.
    pub fn writes(&self) -> Vec<(IssueKey, ChangeSet)> {
        self.state()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::ApplyTransition { key, changes } => {
                    Some((key.clone(), changes.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Current payload of an issue.
    pub fn issue(&self, key: &str) -> Option<RawIssue> {
        self.state()
            .issues
            .iter()
            .find(|i| i.key.as_deref() == Some(key))
            .cloned()
    }

    /// Stored changelog of an issue, including entries added by writes.
    pub fn changelog(&self, key: &str) -> Vec<TransitionEvent> {
        self.state()
            .changelogs
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, MockTrackerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `op` and return the injected error, if any.
    fn record(&self, op: MockOperation) -> Result<(), TrackerError> {
        self.inject(op).map_err(|injected| injected.error)
    }

    fn inject(&self, op: MockOperation) -> Result<(), Injected> {
        let mut inner = self.state();
        let mut injected = None;
        for failure in inner.failures.iter_mut() {
            if failure.remaining == Some(0) {
                continue;
            }
            if let Some(error) = failure.on.error_for(&op) {
                if let Some(n) = failure.remaining.as_mut() {
                    *n -= 1;
                }
                injected = Some(Injected {
                    error,
                    landed: failure.on.landed(),
                });
                break;
            }
        }
        inner.operations.push(op);
        match injected {
            Some(i) => Err(i),
            None => Ok(()),
        }
    }
}

fn in_scope(issue: &RawIssue, components: &[String]) -> bool {
    if components.is_empty() {
        return true;
    }
    components.iter().any(|c| {
        issue.project.as_deref() == Some(c.as_str())
            || issue.component.as_deref().is_some_and(|comp| {
                comp == c || comp.starts_with(&format!("{}:", c))
            })
    })
}

/// Apply one change to a payload, returning the changelog diffs it implies.
fn apply_change(issue: &mut RawIssue, change: &AttributeChange) -> Vec<FieldDiff> {
    match change {
        AttributeChange::Resolution { to, .. } => {
            let mut diffs = vec![FieldDiff::new(
                FieldKey::Resolution,
                issue.resolution.as_deref(),
                Some(to.as_str()),
            )];
            if issue.status.as_deref() != Some(Status::Resolved.as_str()) {
                diffs.push(FieldDiff::new(
                    FieldKey::Status,
                    issue.status.as_deref(),
                    Some(Status::Resolved.as_str()),
                ));
                issue.status = Some(Status::Resolved.as_str().to_string());
            }
            issue.resolution = Some(to.as_str().to_string());
            diffs
        }
        AttributeChange::Type { to, .. } => {
            let diff = FieldDiff::new(FieldKey::Type, issue.issue_type.as_deref(), Some(to.as_str()));
            issue.issue_type = Some(to.as_str().to_string());
            vec![diff]
        }
        AttributeChange::Severity { to, .. } => {
            let diff = FieldDiff::new(
                FieldKey::Severity,
                issue.severity.as_deref(),
                Some(to.as_str()),
            );
            issue.severity = Some(to.as_str().to_string());
            vec![diff]
        }
        AttributeChange::Assignee { to, .. } => {
            let diff = FieldDiff::new(FieldKey::Assignee, issue.assignee.as_deref(), to.as_deref());
            issue.assignee = to.clone();
            vec![diff]
        }
        AttributeChange::Tags { to, .. } => {
            let old = issue.tags.join(",");
            let new = to.join(",");
            let diff = FieldDiff::new(FieldKey::Tags, Some(old.as_str()), Some(new.as_str()));
            issue.tags = to.clone();
            vec![diff]
        }
        // Comments are not changelog entries.
        AttributeChange::Comment { text, .. } => {
            issue.comments.push(RawComment {
                login: Some(RECOVERY_LOGIN.to_string()),
                markdown: Some(text.clone()),
                created_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%S%z").to_string()),
                ..RawComment::default()
            });
            Vec::new()
        }
    }
}

/// Login the mock writes comments as.
const RECOVERY_LOGIN: &str = "triage-recover";

#[async_trait]
impl IssueTracker for MockTracker {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<RawIssue>, TrackerError> {
        self.record(MockOperation::Search {
            statuses: filters.statuses.clone(),
            components: filters.components.clone(),
        })?;

        let inner = self.state();
        Ok(inner
            .issues
            .iter()
            .filter(|i| {
                i.status
                    .as_deref()
                    .and_then(|s| s.parse::<Status>().ok())
                    .is_some_and(|s| filters.admits(s))
            })
            .filter(|i| in_scope(i, &filters.components))
            .cloned()
            .collect())
    }

    async fn fetch_changelog(&self, key: &IssueKey) -> Result<Vec<TransitionEvent>, TrackerError> {
        self.record(MockOperation::FetchChangelog { key: key.clone() })?;

        let inner = self.state();
        if !inner
            .issues
            .iter()
            .any(|i| i.key.as_deref() == Some(key.as_str()))
        {
            return Err(TrackerError::NotFound(key.to_string()));
        }
        Ok(inner
            .changelogs
            .get(key.as_str())
            .map(|events| events.iter().filter(|e| !e.is_technical()).cloned().collect())
            .unwrap_or_default())
    }

    async fn resolve_login(&self, display_name: &str) -> Result<Option<String>, TrackerError> {
        self.record(MockOperation::ResolveLogin {
            name: display_name.to_string(),
        })?;

        let inner = self.state();
        let named: Vec<&String> = inner
            .users
            .iter()
            .filter(|(_, name)| name == display_name)
            .map(|(login, _)| login)
            .collect();
        if let [login] = named.as_slice() {
            return Ok(Some((*login).clone()));
        }
        if !named.is_empty() {
            return Ok(None);
        }
        Ok(inner
            .users
            .iter()
            .find(|(login, _)| login == display_name)
            .map(|(login, _)| login.clone()))
    }

    async fn apply_transition(
        &self,
        key: &IssueKey,
        changes: &ChangeSet,
    ) -> Result<(), WriteFailure> {
        let injected = self
            .inject(MockOperation::ApplyTransition {
                key: key.clone(),
                changes: changes.clone(),
            })
            .err();
        let landed = match &injected {
            Some(i) if i.landed == 0 => return Err(WriteFailure::untouched(i.error.clone())),
            Some(i) => i.landed.min(changes.changes.len()),
            None => changes.changes.len(),
        };

        let mut inner = self.state();
        let issue = inner
            .issues
            .iter_mut()
            .find(|i| i.key.as_deref() == Some(key.as_str()))
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))?;

        if issue.status.as_deref() == Some(Status::Closed.as_str()) {
            return Err(TrackerError::Rejected(format!("{} is closed", key)).into());
        }

        let applied = &changes.changes[..landed];
        let diffs: Vec<FieldDiff> = applied
            .iter()
            .flat_map(|c| apply_change(issue, c))
            .collect();

        inner
            .changelogs
            .entry(key.to_string())
            .or_default()
            .push(TransitionEvent {
                at: Utc::now(),
                actor: changes.actor(),
                diffs,
            });

        match injected {
            Some(i) => Err(WriteFailure {
                applied: applied.to_vec(),
                error: i.error,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Actor, Resolution, Severity};

    fn raw(key: &str, status: &str, component: &str) -> RawIssue {
        RawIssue {
            key: Some(key.into()),
            rule: Some("R1".into()),
            component: Some(component.into()),
            message: Some("m".into()),
            status: Some(status.into()),
            ..RawIssue::default()
        }
    }

    fn key(k: &str) -> IssueKey {
        IssueKey::new(k).unwrap()
    }

    fn change_set(dest: &str, changes: Vec<AttributeChange>) -> ChangeSet {
        ChangeSet {
            source: key("SRC"),
            destination: key(dest),
            changes,
        }
    }

    #[tokio::test]
    async fn search_filters_by_status_and_component() {
        let tracker = MockTracker::new()
            .with_issue(raw("A", "CLOSED", "proj:a.py"))
            .with_issue(raw("B", "OPEN", "proj:b.py"))
            .with_issue(raw("C", "OPEN", "other:c.py"));

        let closed = tracker
            .search(&SearchFilters::closed(vec![], 500))
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);

        let scoped = tracker
            .search(&SearchFilters::candidates(vec!["proj".into()], 500))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].key.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn changelog_drops_technical_entries() {
        let event = |key: &str| TransitionEvent {
            at: Utc::now(),
            actor: Actor::System,
            diffs: vec![FieldDiff::new(FieldKey::from_wire(key), None, Some("x"))],
        };
        let tracker = MockTracker::new()
            .with_issue(raw("A", "CLOSED", "p:a"))
            .with_changelog("A", vec![event("effort"), event("status")]);

        let changelog = tracker.fetch_changelog(&key("A")).await.unwrap();
        assert_eq!(changelog.len(), 1);
        assert_eq!(changelog[0].diffs[0].key, FieldKey::Status);
    }

    #[tokio::test]
    async fn changelog_of_unknown_issue_not_found() {
        let tracker = MockTracker::new();
        let result = tracker.fetch_changelog(&key("NOPE")).await;
        assert!(matches!(result, Err(TrackerError::NotFound(_))));
    }

    #[tokio::test]
    async fn apply_transition_updates_issue_and_changelog() {
        let tracker = MockTracker::new().with_issue(raw("B", "OPEN", "p:b"));
        let changes = change_set(
            "B",
            vec![
                AttributeChange::Resolution {
                    from: None,
                    to: Resolution::WontFix,
                },
                AttributeChange::Severity {
                    from: None,
                    to: Severity::Minor,
                },
            ],
        );

        tracker.apply_transition(&key("B"), &changes).await.unwrap();

        let issue = tracker.issue("B").unwrap();
        assert_eq!(issue.status.as_deref(), Some("RESOLVED"));
        assert_eq!(issue.resolution.as_deref(), Some("WONTFIX"));
        assert_eq!(issue.severity.as_deref(), Some("MINOR"));

        let changelog = tracker.changelog("B");
        assert_eq!(changelog.len(), 1);
        assert_eq!(changelog[0].actor, changes.actor());
        assert_eq!(tracker.writes().len(), 1);
    }

    #[tokio::test]
    async fn apply_transition_rejects_closed() {
        let tracker = MockTracker::new().with_issue(raw("A", "CLOSED", "p:a"));
        let result = tracker
            .apply_transition(&key("A"), &change_set("A", vec![]))
            .await;
        assert!(matches!(
            result,
            Err(WriteFailure {
                error: TrackerError::Rejected(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn partial_write_reports_landed_changes() {
        let tracker = MockTracker::new()
            .with_issue(raw("B", "OPEN", "p:b"))
            .fail_on(FailOn::ApplyTransitionAfter(
                1,
                TrackerError::PermissionDenied("transition".into()),
            ));
        let severity = AttributeChange::Severity {
            from: None,
            to: Severity::Info,
        };
        let changes = change_set(
            "B",
            vec![
                severity.clone(),
                AttributeChange::Resolution {
                    from: None,
                    to: Resolution::FalsePositive,
                },
            ],
        );

        let failure = tracker
            .apply_transition(&key("B"), &changes)
            .await
            .unwrap_err();

        assert_eq!(failure.applied, vec![severity]);
        let issue = tracker.issue("B").unwrap();
        assert_eq!(issue.severity.as_deref(), Some("INFO"));
        assert_eq!(issue.status.as_deref(), Some("OPEN"));
    }

    #[tokio::test]
    async fn comments_are_added_to_the_issue() {
        let tracker = MockTracker::new().with_issue(raw("B", "OPEN", "p:b"));
        let changes = change_set(
            "B",
            vec![AttributeChange::Comment {
                author: Some("alice".into()),
                text: "Generated code".into(),
            }],
        );

        tracker.apply_transition(&key("B"), &changes).await.unwrap();

        let issue = tracker.issue("B").unwrap();
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.comments[0].markdown.as_deref(), Some("Generated code"));
        assert!(tracker.changelog("B")[0].diffs.is_empty());
    }

    #[tokio::test]
    async fn logins_resolve_by_display_name() {
        let tracker = MockTracker::new()
            .with_user("alice", "Alice Smith")
            .with_user("asmith", "A. Smith")
            .with_user("bob", "Bob")
            .with_user("bob2", "Bob");

        assert_eq!(
            tracker.resolve_login("Alice Smith").await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(
            tracker.resolve_login("asmith").await.unwrap().as_deref(),
            Some("asmith")
        );
        assert_eq!(tracker.resolve_login("Bob").await.unwrap(), None);
        assert_eq!(tracker.resolve_login("Nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn fail_on_times_then_recovers() {
        let tracker = MockTracker::new()
            .with_issue(raw("A", "OPEN", "p:a"))
            .fail_on_times(FailOn::Search(TrackerError::RateLimited), 1);

        let filters = SearchFilters::candidates(vec![], 500);
        assert_eq!(
            tracker.search(&filters).await,
            Err(TrackerError::RateLimited)
        );
        assert_eq!(tracker.search(&filters).await.unwrap().len(), 1);
        assert_eq!(tracker.operations().len(), 2);
    }

    #[tokio::test]
    async fn fail_on_single_issue() {
        let tracker = MockTracker::new()
            .with_issue(raw("A", "OPEN", "p:a"))
            .with_issue(raw("B", "OPEN", "p:b"))
            .fail_on(FailOn::ApplyTransitionFor(
                key("A"),
                TrackerError::PermissionDenied("administer issues".into()),
            ));

        assert!(tracker
            .apply_transition(&key("A"), &change_set("A", vec![]))
            .await
            .is_err());
        assert!(tracker
            .apply_transition(&key("B"), &change_set("B", vec![]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn fail_on_search_status() {
        let tracker = MockTracker::new().fail_on(FailOn::SearchStatus(
            Status::Closed,
            TrackerError::Network("down".into()),
        ));
        assert!(tracker
            .search(&SearchFilters::closed(vec![], 500))
            .await
            .is_err());
        assert!(tracker
            .search(&SearchFilters::candidates(vec![], 500))
            .await
            .is_ok());
    }
}
