//! tracker::traits
//!
//! Issue tracker trait definition.
//!
//! # Design
//!
//! The `IssueTracker` trait is async because every operation is network I/O
//! against the tracking service. Reads return untrusted `RawIssue` payloads;
//! validation happens in the engine's intake step, not here.
//!
//! The tracker:
//! - Returns complete result sets from `search` (pagination and splitting
//!   around server result limits are internal)
//! - Drops technical changelog entries before returning them
//! - Maps the display names found in changelogs back to logins
//! - Applies a `ChangeSet` in one call, recording it as an automated action.
//!   A failed write reports which changes are still on the destination.
//!
//! # Example
//!
//! ```ignore
//! use triage_recover::tracker::{IssueTracker, SearchFilters};
//!
//! async fn count_closed(tracker: &dyn IssueTracker) -> Result<usize, TrackerError> {
//!     let filters = SearchFilters::closed(vec!["my-project".into()], 500);
//!     Ok(tracker.search(&filters).await?.len())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{AttributeChange, ChangeSet, IssueKey, RawIssue, Status, TransitionEvent};

/// Errors from tracker operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackerError {
    /// The token was rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The token lacks the permission for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server refused the request as invalid.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// The search matched more issues than the server can page through,
    /// even after splitting it.
    #[error("search matched {total} issues, more than the {limit} the server can return; narrow it with component keys")]
    TooManyResults { total: u64, limit: u64 },

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// The response body could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network or connection error.
    #[error("network error: {0}")]
    Network(String),
}

impl TrackerError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackerError::RateLimited | TrackerError::Network(_) => true,
            TrackerError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A write that did not complete.
///
/// `applied` lists the changes still on the destination: those that landed
/// before `error` and could not be undone.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{error}")]
pub struct WriteFailure {
    pub applied: Vec<AttributeChange>,
    pub error: TrackerError,
}

impl WriteFailure {
    /// A failure that left the destination untouched.
    pub fn untouched(error: TrackerError) -> Self {
        Self {
            applied: Vec::new(),
            error,
        }
    }
}

impl From<TrackerError> for WriteFailure {
    fn from(error: TrackerError) -> Self {
        Self::untouched(error)
    }
}

/// Filters for a bulk issue search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilters {
    /// Statuses to include
    pub statuses: Vec<Status>,
    /// Component/project keys. Empty means unscoped.
    pub components: Vec<String>,
    /// Issues per page
    pub page_size: u32,
}

impl SearchFilters {
    /// Every closed issue in scope.
    pub fn closed(components: Vec<String>, page_size: u32) -> Self {
        Self {
            statuses: vec![Status::Closed],
            components,
            page_size,
        }
    }

    /// Every issue that can still receive triage in scope.
    pub fn candidates(components: Vec<String>, page_size: u32) -> Self {
        Self {
            statuses: Status::NON_CLOSED.to_vec(),
            components,
            page_size,
        }
    }

    /// Whether `status` passes this filter.
    pub fn admits(&self, status: Status) -> bool {
        self.statuses.contains(&status)
    }
}

/// The IssueTracker trait for reading and updating issues on a tracking
/// service.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the runner shares one tracker
/// across concurrent per-issue tasks.
///
/// # Error Handling
///
/// Callers should handle:
/// - `AuthFailed` / `PermissionDenied`: fix the token, do not retry
/// - `RateLimited` / `Network` / 5xx `Api`: transient, retry reads
/// - `TooManyResults`: narrow the search scope
/// - `WriteFailure::applied`: report it, the destination is partly updated
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Tracker name (e.g., "sonarqube", "mock").
    fn name(&self) -> &'static str;

    /// Return every issue matching `filters`, across all pages, with their
    /// comments.
    ///
    /// # Errors
    ///
    /// - `TooManyResults` if the matching set exceeds the server's search
    ///   window and cannot be split further
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<RawIssue>, TrackerError>;

    /// Return the triage-relevant changelog of one issue, in tracker order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the issue doesn't exist
    async fn fetch_changelog(&self, key: &IssueKey) -> Result<Vec<TransitionEvent>, TrackerError>;

    /// Login of the user shown as `display_name` in a changelog.
    ///
    /// `None` when no user, or more than one, carries that name.
    async fn resolve_login(&self, display_name: &str) -> Result<Option<String>, TrackerError>;

    /// Apply every change in `changes` to issue `key`, tagged as an
    /// automated recovery from `changes.source`.
    ///
    /// Everything that can be checked is checked before the first write.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the issue doesn't exist
    /// - `PermissionDenied` if the token may not perform one of the writes
    /// - `Rejected` if the server refuses a transition
    async fn apply_transition(&self, key: &IssueKey, changes: &ChangeSet)
        -> Result<(), WriteFailure>;
}
