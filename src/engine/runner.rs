//! engine::runner
//!
//! Run orchestration: fetch -> intake -> hydrate -> classify -> match ->
//! replay -> report.
//!
//! # Concurrency
//!
//! The two bulk searches run concurrently and either failing aborts the run.
//! Per-issue work (changelog reads, then replays) runs on a `JoinSet`, gated
//! by a semaphore sized by `RunOptions::concurrency`. Replays never share a
//! destination: a destination claimed by two closed issues is reported as
//! ambiguous for both, so concurrent writes always target distinct issues.
//!
//! # Cancellation
//!
//! Per-issue tasks check the `CancelFlag` once they hold a permit. Work not
//! started by then is reported as `Cancelled`; work already started finishes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::classify::{classify, Verdict};
use super::intake::intake;
use super::matcher::{match_siblings, CandidatePool, SiblingMatch};
use super::replay::{apply_changelog, RecoverySet, ReplayOutcome};
use super::report::{Action, RecoveryReport, ReportEntry};
use crate::core::fingerprint::Fingerprint;
use crate::core::types::{IssueKey, IssueRecord, IssueSummary, RawIssue};
use crate::tracker::{with_retry, IssueTracker, RetryPolicy, SearchFilters, TrackerError};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A bulk search failed; without complete sets nothing can be decided.
    #[error("failed to fetch {set} issues: {source}")]
    Fetch {
        set: &'static str,
        #[source]
        source: TrackerError,
    },
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which issues to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Component/project keys. Empty means unscoped.
    pub components: Vec<String>,
    pub page_size: u32,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            page_size: 500,
        }
    }
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub recover: RecoverySet,
    /// Concurrent per-issue requests
    pub concurrency: usize,
    /// Retry policy for changelog reads
    pub retry: RetryPolicy,
    pub cancel: CancelFlag,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            recover: RecoverySet::all(),
            concurrency: 8,
            retry: RetryPolicy::default(),
            cancel: CancelFlag::new(),
        }
    }
}

/// Raw results of the two bulk searches.
#[derive(Debug, Default)]
pub struct IssueSets {
    pub closed: Vec<RawIssue>,
    pub candidates: Vec<RawIssue>,
}

/// Fetch the closed set and the candidate set, concurrently, with retry.
///
/// # Errors
///
/// `RunError::Fetch` if either search still fails after retrying.
pub async fn fetch_issue_sets(
    tracker: &dyn IssueTracker,
    scope: &Scope,
    retry: &RetryPolicy,
) -> Result<IssueSets, RunError> {
    let closed_filters = SearchFilters::closed(scope.components.clone(), scope.page_size);
    let candidate_filters = SearchFilters::candidates(scope.components.clone(), scope.page_size);

    let closed = async {
        with_retry(retry, "closed issue search", || tracker.search(&closed_filters))
            .await
            .map_err(|source| RunError::Fetch {
                set: "closed",
                source,
            })
    };
    let candidates = async {
        with_retry(retry, "candidate issue search", || {
            tracker.search(&candidate_filters)
        })
        .await
        .map_err(|source| RunError::Fetch {
            set: "candidate",
            source,
        })
    };

    let (closed, candidates) = tokio::try_join!(closed, candidates)?;
    tracing::info!(
        "fetched {} closed and {} candidate issues from {}",
        closed.len(),
        candidates.len(),
        tracker.name()
    );
    Ok(IssueSets { closed, candidates })
}

/// Fetch both sets, then run.
pub async fn recover(
    tracker: Arc<dyn IssueTracker>,
    scope: &Scope,
    options: &RunOptions,
) -> Result<RecoveryReport, RunError> {
    let sets = fetch_issue_sets(tracker.as_ref(), scope, &options.retry).await?;
    Ok(run(tracker, sets.closed, sets.candidates, options).await)
}

/// Per-issue state between phases.
enum Slot {
    Done(ReportEntry),
    Mistaken(IssueRecord, Verdict),
}

fn base_entry(summary: &IssueSummary, verdict: Verdict, action: Action) -> ReportEntry {
    ReportEntry::new(
        summary.key.clone(),
        Fingerprint::of(summary).digest(),
        verdict,
        action,
    )
}

/// Result of one hydration task.
enum Hydrated {
    Record(IssueRecord),
    Failed(IssueSummary, TrackerError),
    Cancelled(IssueSummary),
}

/// Recover triage on `candidate_set` from mistakenly closed issues in
/// `closed_set`.
///
/// Never fails as a whole: malformed records are skipped, per-issue failures
/// become `Failed` entries.
pub async fn run(
    tracker: Arc<dyn IssueTracker>,
    closed_set: Vec<RawIssue>,
    candidate_set: Vec<RawIssue>,
    options: &RunOptions,
) -> RecoveryReport {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    tracing::info!(
        "run {} started ({})",
        run_id,
        if options.dry_run { "dry run" } else { "apply" }
    );

    let closed = intake(closed_set, "closed");
    let candidates = intake(candidate_set, "candidate");
    let malformed_skipped = closed.malformed + candidates.malformed;
    let closed_total = closed.issues.len();
    let candidates_total = candidates.issues.len();

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));

    // Phase 1: hydrate and classify closed issues.
    let mut slots: Vec<Option<Slot>> = Vec::with_capacity(closed_total);
    let mut fallbacks: Vec<ReportEntry> = Vec::with_capacity(closed_total);
    let mut tasks = JoinSet::new();
    for (idx, summary) in closed.issues.into_iter().enumerate() {
        fallbacks.push(base_entry(&summary, Verdict::Unclassified, Action::Failed));
        if !summary.status.is_closed() {
            slots.push(Some(Slot::Done(base_entry(
                &summary,
                Verdict::NotClosed,
                Action::NotEligible,
            ))));
            continue;
        }
        slots.push(None);

        let tracker = Arc::clone(&tracker);
        let semaphore = Arc::clone(&semaphore);
        let cancel = options.cancel.clone();
        let retry = options.retry;
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (idx, Hydrated::Cancelled(summary));
            };
            if cancel.is_cancelled() {
                return (idx, Hydrated::Cancelled(summary));
            }
            let what = format!("changelog of {}", summary.key);
            let fetched = with_retry(&retry, &what, || tracker.fetch_changelog(&summary.key)).await;
            match fetched {
                Ok(changelog) => (idx, Hydrated::Record(IssueRecord::hydrate(summary, changelog))),
                Err(e) => (idx, Hydrated::Failed(summary, e)),
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (idx, hydrated) = match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("hydration task aborted: {}", e);
                continue;
            }
        };
        slots[idx] = Some(match hydrated {
            Hydrated::Record(record) => {
                for drift in record.check_consistency() {
                    tracing::warn!(
                        "{}: current {:?} is {:?} but changelog says {:?}",
                        record.key(),
                        drift.field,
                        drift.current,
                        drift.replayed
                    );
                }
                let verdict = classify(&record);
                tracing::debug!("{}: {}", record.key(), verdict);
                if verdict.is_mistaken() {
                    Slot::Mistaken(record, verdict)
                } else {
                    Slot::Done(base_entry(&record.summary, verdict, Action::NotEligible))
                }
            }
            Hydrated::Failed(summary, e) => {
                tracing::warn!("{}: could not read changelog: {}", summary.key, e);
                let mut entry = base_entry(&summary, Verdict::Unclassified, Action::Failed);
                entry.error = Some(e.to_string());
                Slot::Done(entry)
            }
            Hydrated::Cancelled(summary) => Slot::Done(base_entry(
                &summary,
                Verdict::Unclassified,
                Action::Cancelled,
            )),
        });
    }

    // Phase 2: match.
    let pool = CandidatePool::build(candidates.issues);
    let mut entries: Vec<Option<ReportEntry>> = Vec::with_capacity(slots.len());
    let mut uniques: Vec<(usize, IssueRecord, IssueSummary)> = Vec::new();

    for (idx, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Slot::Done(entry)) => entries.push(Some(entry)),
            Some(Slot::Mistaken(record, verdict)) => {
                let matched = match_siblings(&record.summary, &pool);
                let mut entry = base_entry(&record.summary, verdict, Action::Orphaned);
                entry.candidates = matched.candidates().iter().map(|c| c.key.clone()).collect();
                match matched {
                    SiblingMatch::Orphaned => {
                        tracing::info!("{}: no open sibling", record.key());
                        entries.push(Some(entry));
                    }
                    SiblingMatch::Ambiguous(siblings) => {
                        tracing::warn!(
                            "{}: {} open siblings, resolve manually",
                            record.key(),
                            siblings.len()
                        );
                        entry.action = Action::Ambiguous;
                        entries.push(Some(entry));
                    }
                    SiblingMatch::Unique(sibling) => {
                        entry.destination = Some(sibling.key.clone());
                        uniques.push((idx, record, sibling.clone()));
                        entries.push(Some(entry));
                    }
                }
            }
            None => {
                let mut entry = fallbacks[idx].clone();
                entry.error = Some("hydration task aborted".to_string());
                entries.push(Some(entry));
            }
        }
    }

    // Contended destinations are ambiguous for every claimant.
    let mut claims: HashMap<IssueKey, Vec<IssueKey>> = HashMap::new();
    for (_, record, destination) in &uniques {
        claims
            .entry(destination.key.clone())
            .or_default()
            .push(record.key().clone());
    }
    let mut replays = Vec::new();
    for (idx, record, destination) in uniques {
        let claimants = &claims[&destination.key];
        if claimants.len() > 1 {
            let others: Vec<String> = claimants
                .iter()
                .filter(|k| *k != record.key())
                .map(|k| k.to_string())
                .collect();
            tracing::warn!(
                "{}: sibling {} is also matched by {}, resolve manually",
                record.key(),
                destination.key,
                others.join(", ")
            );
            if let Some(entry) = entries[idx].as_mut() {
                entry.action = Action::Ambiguous;
                entry.error = Some(format!(
                    "destination {} also matched by {}",
                    destination.key,
                    others.join(", ")
                ));
            }
        } else {
            replays.push((idx, record, destination));
        }
    }

    // Phase 3: replay onto distinct destinations.
    let mut tasks = JoinSet::new();
    for (idx, record, destination) in replays {
        let tracker = Arc::clone(&tracker);
        let semaphore = Arc::clone(&semaphore);
        let cancel = options.cancel.clone();
        let recover = options.recover.clone();
        let dry_run = options.dry_run;
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (idx, None);
            };
            if cancel.is_cancelled() {
                return (idx, None);
            }
            let outcome =
                apply_changelog(tracker.as_ref(), &record, &destination, &recover, dry_run).await;
            (idx, Some(outcome))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (idx, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("replay task aborted: {}", e);
                continue;
            }
        };
        let Some(entry) = entries[idx].as_mut() else {
            continue;
        };
        match outcome {
            None => entry.action = Action::Cancelled,
            Some(Ok(ReplayOutcome::AlreadyInSync)) => entry.action = Action::AlreadyInSync,
            Some(Ok(ReplayOutcome::Planned(change_set))) => {
                entry.action = Action::Planned;
                entry.changes = change_set.changes;
            }
            Some(Ok(ReplayOutcome::Applied(change_set))) => {
                entry.action = Action::Applied;
                entry.applied = change_set.changes.clone();
                entry.changes = change_set.changes;
            }
            Some(Ok(ReplayOutcome::Failed {
                change_set,
                applied,
                error,
            })) => {
                entry.action = Action::Failed;
                entry.changes = change_set.changes;
                entry.applied = applied;
                entry.error = Some(error.to_string());
            }
            Some(Err(e)) => {
                entry.action = Action::Failed;
                entry.error = Some(e.to_string());
            }
        }
    }

    // A replay that never reported back stays Orphaned with a destination.
    for entry in entries.iter_mut().flatten() {
        if entry.action == Action::Orphaned && entry.destination.is_some() {
            entry.action = Action::Failed;
            entry.error = Some("replay task aborted".to_string());
        }
    }

    let report = RecoveryReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        dry_run: options.dry_run,
        closed_total,
        candidates_total,
        malformed_skipped,
        entries: entries.into_iter().flatten().collect(),
    };

    let summary = report.summary();
    tracing::info!(
        "run {} finished: {} examined, {} mistaken, {} applied, {} planned, {} ambiguous, {} failed",
        run_id,
        summary.examined,
        summary.mistaken,
        summary.applied,
        summary.planned,
        summary.ambiguous,
        summary.failed
    );
    report
}
