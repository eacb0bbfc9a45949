//! engine::matcher
//!
//! Sibling matcher: find the open issues that are the same finding as a
//! closed one.
//!
//! # Design
//!
//! The pool is built once per run and indexed by fingerprint, so each lookup
//! is a hash lookup. Matches are exact on the fingerprint; the line only
//! orders them (closest first, unknown lines last, then by key). A match is
//! only acted on when it is unique. Ties are never broken by guessing.

use std::collections::HashMap;

use crate::core::fingerprint::{line_distance, Fingerprint};
use crate::core::types::IssueSummary;

/// Candidate issues indexed by fingerprint. Immutable once built.
#[derive(Debug, Default)]
pub struct CandidatePool {
    index: HashMap<Fingerprint, Vec<IssueSummary>>,
    len: usize,
}

impl CandidatePool {
    /// Index `candidates`. Closed issues are left out.
    pub fn build(candidates: impl IntoIterator<Item = IssueSummary>) -> Self {
        let mut index: HashMap<Fingerprint, Vec<IssueSummary>> = HashMap::new();
        let mut len = 0;
        for candidate in candidates {
            if candidate.status.is_closed() {
                tracing::debug!("{}: closed issue left out of candidate pool", candidate.key);
                continue;
            }
            index
                .entry(Fingerprint::of(&candidate))
                .or_default()
                .push(candidate);
            len += 1;
        }
        Self { index, len }
    }

    /// Number of indexed candidates.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Candidates sharing `fingerprint`, in pool order.
    pub fn get(&self, fingerprint: &Fingerprint) -> &[IssueSummary] {
        self.index.get(fingerprint).map_or(&[], Vec::as_slice)
    }
}

/// Result of matching one closed issue against the pool.
#[derive(Debug, Clone, PartialEq)]
pub enum SiblingMatch<'a> {
    /// No candidate shares the fingerprint.
    Orphaned,
    /// Exactly one candidate does.
    Unique(&'a IssueSummary),
    /// Several do; ordered by line proximity.
    Ambiguous(Vec<&'a IssueSummary>),
}

impl<'a> SiblingMatch<'a> {
    /// Every matched candidate, best first.
    pub fn candidates(&self) -> Vec<&'a IssueSummary> {
        match self {
            SiblingMatch::Orphaned => Vec::new(),
            SiblingMatch::Unique(c) => vec![*c],
            SiblingMatch::Ambiguous(cs) => cs.clone(),
        }
    }
}

/// Candidates with the same fingerprint as `closed`, closest line first.
pub fn find_siblings<'a>(closed: &IssueSummary, pool: &'a CandidatePool) -> Vec<&'a IssueSummary> {
    let mut siblings: Vec<&IssueSummary> = pool
        .get(&Fingerprint::of(closed))
        .iter()
        .filter(|c| c.key != closed.key)
        .collect();

    siblings.sort_by(|a, b| {
        let da = line_distance(closed.line, a.line);
        let db = line_distance(closed.line, b.line);
        (da.is_none(), da, &a.key).cmp(&(db.is_none(), db, &b.key))
    });
    siblings
}

/// Match `closed` against the pool.
pub fn match_siblings<'a>(closed: &IssueSummary, pool: &'a CandidatePool) -> SiblingMatch<'a> {
    let mut siblings = find_siblings(closed, pool);
    match siblings.len() {
        0 => SiblingMatch::Orphaned,
        1 => SiblingMatch::Unique(siblings.remove(0)),
        _ => SiblingMatch::Ambiguous(siblings),
    }
}
