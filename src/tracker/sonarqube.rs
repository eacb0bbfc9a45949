//! tracker::sonarqube
//!
//! SonarQube tracker implementation over the Web API.
//!
//! # Design
//!
//! Implements `IssueTracker` with:
//! - `GET api/issues/search` for bulk reads, paged internally, with comments
//! - `GET api/issues/changelog` for per-issue history
//! - `GET api/users/search` to map changelog display names to logins
//! - `POST api/issues/{do_transition,set_type,set_severity,assign,set_tags,add_comment}`
//!   for writes
//!
//! # Authentication
//!
//! The token is sent as the HTTP basic-auth user with an empty password.
//! Anonymous access is attempted when no token is configured.
//!
//! # Search Window
//!
//! The server refuses to page past 10 000 results. A search matching more is
//! split: first into creation-date ranges, halved until each fits or covers a
//! single day, then a single day into one search per directory (from the
//! `directories` facet). Only a slice that still overflows after that fails,
//! with `TrackerError::TooManyResults`, instead of returning a silently
//! truncated set.
//!
//! # Writes
//!
//! Before the first write the destination is read back with its `actions`
//! and `transitions`, and a change set needing anything missing is refused
//! untouched. When a write fails part way, the writes that landed are undone
//! newest first; whatever cannot be undone is returned in
//! `WriteFailure::applied`.
//!
//! # Example
//!
//! ```ignore
//! use triage_recover::tracker::sonarqube::SonarQubeTracker;
//! use triage_recover::tracker::{IssueTracker, SearchFilters};
//!
//! let tracker = SonarQubeTracker::new("https://sonar.example.com", Some(token))?;
//! let closed = tracker.search(&SearchFilters::closed(vec!["my-project".into()], 500)).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::traits::{IssueTracker, SearchFilters, TrackerError, WriteFailure};
use crate::core::types::{
    parse_timestamp, Actor, AttributeChange, ChangeSet, FieldDiff, FieldKey, IssueKey, RawIssue,
    Resolution, TransitionEvent,
};

/// Results the server will page through for one search.
pub const SEARCH_WINDOW: u64 = 10_000;

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("triage-recover/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// SonarQube tracker.
#[derive(Clone)]
pub struct SonarQubeTracker {
    client: Client,
    /// Server root URL, without trailing slash
    base_url: String,
    token: Option<String>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for SonarQubeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarQubeTracker")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl SonarQubeTracker {
    /// Create a tracker for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Network` if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .user_agent(USER_AGENT_VALUE)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrackerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build URL for a Web API endpoint.
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.basic_auth(token, Some("")),
            None => request,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TrackerError> {
        tracing::debug!("GET {} {:?}", path, query);
        let response = self
            .authorize(self.client.get(self.api_url(path)))
            .query(query)
            .send()
            .await
            .map_err(|e| TrackerError::Network(e.to_string()))?;
        self.handle_response(response).await
    }

    async fn post(&self, path: &str, form: &[(&str, String)]) -> Result<(), TrackerError> {
        tracing::debug!("POST {} {:?}", path, form);
        let response = self
            .authorize(self.client.post(self.api_url(path)))
            .form(form)
            .send()
            .await
            .map_err(|e| TrackerError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, TrackerError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| TrackerError::InvalidResponse(e.to_string()))
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle an error response from the API.
    async fn handle_error_response<T>(
        &self,
        response: Response,
        status: StatusCode,
    ) -> Result<T, TrackerError> {
        let message = match response.json::<SonarErrorResponse>().await {
            Ok(err) if !err.errors.is_empty() => err
                .errors
                .into_iter()
                .map(|e| e.msg)
                .collect::<Vec<_>>()
                .join("; "),
            _ => status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        };

        Err(map_status(status, message))
    }

    /// Run one `do_transition`.
    async fn transition(&self, key: &IssueKey, transition: &str) -> Result<(), TrackerError> {
        self.post(
            "issues/do_transition",
            &[
                ("issue", key.to_string()),
                ("transition", transition.to_string()),
            ],
        )
        .await
    }

    async fn apply_change(
        &self,
        key: &IssueKey,
        change: &AttributeChange,
    ) -> Result<(), TrackerError> {
        let issue = ("issue", key.to_string());
        match change {
            AttributeChange::Resolution { from, to } => {
                let transition = resolution_transition(*to)?;
                let Some(previous) = from else {
                    return self.transition(key, transition).await;
                };
                self.transition(key, "reopen").await?;
                if let Err(e) = self.transition(key, transition).await {
                    let restored = match resolution_transition(*previous) {
                        Ok(back) => self.transition(key, back).await,
                        Err(err) => Err(err),
                    };
                    if let Err(restore) = restored {
                        tracing::error!(
                            "{}: left reopened, could not restore {}: {}",
                            key,
                            previous,
                            restore
                        );
                    }
                    return Err(e);
                }
                Ok(())
            }
            AttributeChange::Type { to, .. } => {
                self.post("issues/set_type", &[issue, ("type", to.to_string())])
                    .await
            }
            AttributeChange::Severity { to, .. } => {
                self.post("issues/set_severity", &[issue, ("severity", to.to_string())])
                    .await
            }
            AttributeChange::Assignee { to, .. } => {
                let mut form = vec![issue];
                if let Some(login) = to {
                    form.push(("assignee", login.clone()));
                }
                self.post("issues/assign", &form).await
            }
            AttributeChange::Tags { to, .. } => {
                self.post("issues/set_tags", &[issue, ("tags", to.join(","))])
                    .await
            }
            AttributeChange::Comment { text, .. } => self.comment(key, text).await,
        }
    }

    async fn comment(&self, key: &IssueKey, text: &str) -> Result<(), TrackerError> {
        self.post(
            "issues/add_comment",
            &[("issue", key.to_string()), ("text", text.to_string())],
        )
        .await
    }

    /// Refuse `changes` before any write if the token may not perform one
    /// of them on `key`.
    async fn preflight(&self, key: &IssueKey, changes: &ChangeSet) -> Result<(), TrackerError> {
        let mut needed = Vec::with_capacity(changes.changes.len() + 1);
        for change in &changes.changes {
            needed.push(required_permission(change)?);
        }
        needed.push(Permission::Action("comment"));

        let response: PermissionsResponse = self
            .get(
                "issues/search",
                &[
                    ("issues", key.to_string()),
                    ("additionalFields", "actions,transitions".to_string()),
                    ("ps", "1".to_string()),
                ],
            )
            .await?;
        let allowed = response
            .issues
            .into_iter()
            .find(|i| i.key == key.as_str())
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))?;

        for permission in needed {
            let granted = match permission {
                Permission::Action(name) => allowed.actions.iter().any(|a| a == name),
                Permission::Transition(name) => allowed.transitions.iter().any(|t| t == name),
            };
            if !granted {
                return Err(TrackerError::PermissionDenied(format!(
                    "{} not allowed on {}",
                    permission, key
                )));
            }
        }
        Ok(())
    }

    /// Write the inverse of `change`.
    async fn undo(&self, key: &IssueKey, change: &AttributeChange) -> Result<(), TrackerError> {
        let inverse = match change {
            AttributeChange::Resolution { from, .. } => {
                self.transition(key, "reopen").await?;
                return match from {
                    Some(previous) => {
                        self.transition(key, resolution_transition(*previous)?)
                            .await
                    }
                    None => Ok(()),
                };
            }
            AttributeChange::Type {
                from: Some(from),
                to,
            } => AttributeChange::Type {
                from: Some(*to),
                to: *from,
            },
            AttributeChange::Severity {
                from: Some(from),
                to,
            } => AttributeChange::Severity {
                from: Some(*to),
                to: *from,
            },
            AttributeChange::Assignee { from, to } => AttributeChange::Assignee {
                from: to.clone(),
                to: from.clone(),
            },
            AttributeChange::Tags { from, to } => AttributeChange::Tags {
                from: to.clone(),
                to: from.clone(),
            },
            _ => {
                return Err(TrackerError::Rejected(format!(
                    "{} cannot be undone",
                    change
                )))
            }
        };
        self.apply_change(key, &inverse).await
    }

    /// Undo `landed` newest first after `error`.
    async fn roll_back(
        &self,
        key: &IssueKey,
        landed: &[&AttributeChange],
        error: TrackerError,
    ) -> WriteFailure {
        let mut stuck = Vec::new();
        for change in landed.iter().rev() {
            if let Err(e) = self.undo(key, change).await {
                tracing::warn!("{}: could not undo {}: {}", key, change, e);
                stuck.push((*change).clone());
            }
        }
        stuck.reverse();
        if !landed.is_empty() {
            tracing::warn!(
                "{}: write failed, undid {} of {} change(s)",
                key,
                landed.len() - stuck.len(),
                landed.len()
            );
        }
        WriteFailure {
            applied: stuck,
            error,
        }
    }

    /// Query for one page of `filters` within `slice`.
    fn search_query(
        &self,
        filters: &SearchFilters,
        slice: &Slice,
        page: u32,
        page_size: u32,
    ) -> Vec<(&'static str, String)> {
        let statuses = filters
            .statuses
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut query = vec![
            ("statuses", statuses),
            ("ps", page_size.to_string()),
            ("p", page.to_string()),
        ];
        if !filters.components.is_empty() {
            query.push(("componentKeys", filters.components.join(",")));
        }
        slice.apply(&mut query);
        query
    }

    async fn search_page(
        &self,
        filters: &SearchFilters,
        slice: &Slice,
        page: u32,
    ) -> Result<SearchResponse, TrackerError> {
        let mut query = self.search_query(filters, slice, page, filters.page_size);
        query.push(("additionalFields", "comments".to_string()));
        self.get("issues/search", &query).await
    }

    /// Page through a slice known to fit in the search window.
    async fn collect_slice(
        &self,
        filters: &SearchFilters,
        slice: &Slice,
        first: SearchResponse,
        issues: &mut Vec<RawIssue>,
    ) -> Result<(), TrackerError> {
        let mut response = first;
        loop {
            let paging = response.paging;
            let received = response.issues.len();
            issues.extend(response.issues);

            let seen = u64::from(paging.page_index) * u64::from(paging.page_size.max(1));
            if received == 0 || seen >= paging.total {
                return Ok(());
            }
            response = self
                .search_page(filters, slice, paging.page_index + 1)
                .await?;
        }
    }

    /// Narrower slices covering `slice`, empty when it cannot be split.
    async fn split(
        &self,
        filters: &SearchFilters,
        slice: &Slice,
    ) -> Result<Vec<Slice>, TrackerError> {
        if slice.directory.is_some() {
            return Ok(Vec::new());
        }
        let (from, to) = match slice.created {
            Some(range) => range,
            None => match self.creation_range(filters).await? {
                Some(range) => range,
                None => return Ok(Vec::new()),
            },
        };

        if from < to {
            let half = u64::try_from((to - from).num_days() / 2).unwrap_or(0);
            let Some(mid) = from.checked_add_days(Days::new(half)) else {
                return Ok(Vec::new());
            };
            let Some(after) = mid.succ_opt() else {
                return Ok(Vec::new());
            };
            return Ok(vec![Slice::created(from, mid), Slice::created(after, to)]);
        }

        let day = Slice::created(from, to);
        Ok(self
            .directories(filters, &day)
            .await?
            .into_iter()
            .map(|directory| Slice {
                directory: Some(directory),
                ..day.clone()
            })
            .collect())
    }

    /// Creation dates of the oldest and newest matching issues.
    async fn creation_range(
        &self,
        filters: &SearchFilters,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, TrackerError> {
        let mut bounds = Vec::with_capacity(2);
        for ascending in ["true", "false"] {
            let mut query = self.search_query(filters, &Slice::default(), 1, 1);
            query.push(("s", "CREATION_DATE".to_string()));
            query.push(("asc", ascending.to_string()));
            let response: SearchResponse = self.get("issues/search", &query).await?;
            let date = response
                .issues
                .first()
                .and_then(|i| i.creation_date.as_deref())
                .and_then(creation_day);
            match date {
                Some(date) => bounds.push(date),
                None => return Ok(None),
            }
        }
        Ok(Some((bounds[0], bounds[1])))
    }

    /// Directories holding issues of `filters` within `slice`.
    async fn directories(
        &self,
        filters: &SearchFilters,
        slice: &Slice,
    ) -> Result<Vec<String>, TrackerError> {
        let mut query = self.search_query(filters, slice, 1, 1);
        query.push(("facets", "directories".to_string()));
        let response: SearchResponse = self.get("issues/search", &query).await?;
        Ok(response
            .facets
            .into_iter()
            .filter(|f| f.property == "directories")
            .flat_map(|f| f.values)
            .filter(|v| v.count > 0)
            .map(|v| v.val)
            .collect())
    }
}

/// Day part of a tracker timestamp, in the server's own offset.
fn creation_day(timestamp: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(timestamp.get(..10)?, "%Y-%m-%d").ok()
}

/// Extra criteria narrowing one part of a split search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Slice {
    /// Inclusive creation-date range
    created: Option<(NaiveDate, NaiveDate)>,
    directory: Option<String>,
}

impl Slice {
    fn created(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            created: Some((from, to)),
            directory: None,
        }
    }

    fn apply(&self, query: &mut Vec<(&'static str, String)>) {
        if let Some((from, to)) = self.created {
            // createdBefore is exclusive.
            let end = to.succ_opt().unwrap_or(to);
            query.push(("createdAfter", from.format("%Y-%m-%d").to_string()));
            query.push(("createdBefore", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(directory) = &self.directory {
            query.push(("directories", directory.clone()));
        }
    }
}

impl std::fmt::Display for Slice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.created, &self.directory) {
            (None, _) => f.write_str("all dates"),
            (Some((from, to)), None) => write!(f, "{}..={}", from, to),
            (Some((from, to)), Some(dir)) => write!(f, "{}..={} in {}", from, to, dir),
        }
    }
}

/// What the token must be allowed to do for one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    Action(&'static str),
    Transition(&'static str),
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Action(name) => write!(f, "action '{}'", name),
            Permission::Transition(name) => write!(f, "transition '{}'", name),
        }
    }
}

/// The first server-side permission a change needs.
///
/// A resolved destination needs `reopen` first; the resolving transition
/// that follows can only be checked once it is open again.
fn required_permission(change: &AttributeChange) -> Result<Permission, TrackerError> {
    Ok(match change {
        AttributeChange::Resolution { from: Some(_), to } => {
            resolution_transition(*to)?;
            Permission::Transition("reopen")
        }
        AttributeChange::Resolution { from: None, to } => {
            Permission::Transition(resolution_transition(*to)?)
        }
        AttributeChange::Type { .. } => Permission::Action("set_type"),
        AttributeChange::Severity { .. } => Permission::Action("set_severity"),
        AttributeChange::Assignee { .. } => Permission::Action("assign"),
        AttributeChange::Tags { .. } => Permission::Action("set_tags"),
        AttributeChange::Comment { .. } => Permission::Action("comment"),
    })
}

/// Map an HTTP error status to a tracker error.
pub fn map_status(status: StatusCode, message: String) -> TrackerError {
    match status {
        StatusCode::UNAUTHORIZED => TrackerError::AuthFailed(message),
        StatusCode::FORBIDDEN => TrackerError::PermissionDenied(message),
        StatusCode::NOT_FOUND => TrackerError::NotFound(message),
        StatusCode::BAD_REQUEST => TrackerError::Rejected(message),
        StatusCode::TOO_MANY_REQUESTS => TrackerError::RateLimited,
        _ => TrackerError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Transition that sets `resolution` on an unresolved issue.
fn resolution_transition(resolution: Resolution) -> Result<&'static str, TrackerError> {
    match resolution {
        Resolution::FalsePositive => Ok("falsepositive"),
        Resolution::WontFix => Ok("wontfix"),
        Resolution::Fixed => Ok("resolve"),
        Resolution::Removed => Err(TrackerError::Rejected(
            "resolution REMOVED can only be set by the scanner".to_string(),
        )),
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct SonarErrorResponse {
    #[serde(default)]
    errors: Vec<SonarErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct SonarErrorMessage {
    msg: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    paging: Paging,
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    facets: Vec<Facet>,
}

#[derive(Debug, Deserialize)]
struct Facet {
    property: String,
    #[serde(default)]
    values: Vec<FacetValue>,
}

#[derive(Debug, Deserialize)]
struct FacetValue {
    val: String,
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Deserialize)]
struct PermissionsResponse {
    #[serde(default)]
    issues: Vec<IssuePermissions>,
}

#[derive(Debug, Deserialize)]
struct IssuePermissions {
    key: String,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    transitions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    login: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    page_index: u32,
    page_size: u32,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ChangelogResponse {
    #[serde(default)]
    changelog: Vec<WireChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChange {
    user: Option<String>,
    creation_date: String,
    #[serde(default)]
    diffs: Vec<WireDiff>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDiff {
    key: String,
    old_value: Option<String>,
    new_value: Option<String>,
}

impl TryFrom<WireChange> for TransitionEvent {
    type Error = TrackerError;

    fn try_from(change: WireChange) -> Result<Self, Self::Error> {
        let at = parse_timestamp(&change.creation_date).ok_or_else(|| {
            TrackerError::InvalidResponse(format!(
                "unparseable changelog date '{}'",
                change.creation_date
            ))
        })?;

        // Entries without an author are generated by the analyzer.
        let actor = match change.user.filter(|u| !u.is_empty()) {
            Some(login) => Actor::User { login },
            None => Actor::System,
        };

        let diffs = change
            .diffs
            .into_iter()
            .map(|d| {
                FieldDiff::new(
                    FieldKey::from_wire(&d.key),
                    d.old_value.as_deref(),
                    d.new_value.as_deref(),
                )
            })
            .collect();

        Ok(TransitionEvent { at, actor, diffs })
    }
}

/// Convert a changelog payload, dropping technical entries.
fn parse_changelog(response: ChangelogResponse) -> Result<Vec<TransitionEvent>, TrackerError> {
    let mut events = Vec::with_capacity(response.changelog.len());
    for change in response.changelog {
        let event = TransitionEvent::try_from(change)?;
        if event.is_technical() {
            tracing::debug!("skipping technical changelog entry at {}", event.at);
            continue;
        }
        events.push(event);
    }
    Ok(events)
}

#[async_trait]
impl IssueTracker for SonarQubeTracker {
    fn name(&self) -> &'static str {
        "sonarqube"
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<RawIssue>, TrackerError> {
        let mut issues = Vec::new();
        let mut pending = vec![Slice::default()];

        while let Some(slice) = pending.pop() {
            let first = self.search_page(filters, &slice, 1).await?;
            let total = first.paging.total;
            if total <= SEARCH_WINDOW {
                self.collect_slice(filters, &slice, first, &mut issues).await?;
                continue;
            }

            let parts = self.split(filters, &slice).await?;
            if parts.is_empty() {
                return Err(TrackerError::TooManyResults {
                    total,
                    limit: SEARCH_WINDOW,
                });
            }
            tracing::info!(
                "search over {} matched {} issues, splitting into {} searches",
                slice,
                total,
                parts.len()
            );
            pending.extend(parts);
        }

        tracing::debug!("search returned {} issues", issues.len());
        Ok(issues)
    }

    async fn fetch_changelog(&self, key: &IssueKey) -> Result<Vec<TransitionEvent>, TrackerError> {
        let response: ChangelogResponse = self
            .get(
                "issues/changelog",
                &[("issue", key.to_string()), ("format", "json".to_string())],
            )
            .await?;
        parse_changelog(response)
    }

    async fn resolve_login(&self, display_name: &str) -> Result<Option<String>, TrackerError> {
        let response: UsersResponse = self
            .get(
                "users/search",
                &[("q", display_name.to_string()), ("ps", "50".to_string())],
            )
            .await?;

        let named: Vec<&WireUser> = response
            .users
            .iter()
            .filter(|u| u.name.as_deref() == Some(display_name))
            .collect();
        match named.as_slice() {
            [user] => Ok(Some(user.login.clone())),
            [] => Ok(response
                .users
                .into_iter()
                .find(|u| u.login == display_name)
                .map(|u| u.login)),
            _ => {
                tracing::warn!("{} users are named '{}'", named.len(), display_name);
                Ok(None)
            }
        }
    }

    async fn apply_transition(
        &self,
        key: &IssueKey,
        changes: &ChangeSet,
    ) -> Result<(), WriteFailure> {
        self.preflight(key, changes).await?;

        let mut landed: Vec<&AttributeChange> = Vec::with_capacity(changes.changes.len());
        for change in &changes.changes {
            if let Err(error) = self.apply_change(key, change).await {
                return Err(self.roll_back(key, &landed, error).await);
            }
            landed.push(change);
        }
        if let Err(error) = self.comment(key, &changes.recovery_note()).await {
            return Err(self.roll_back(key, &landed, error).await);
        }
        Ok(())
    }
}
