//! tracker
//!
//! Issue tracker abstraction and implementations.
//!
//! # Modules
//!
//! - [`traits`] - `IssueTracker` trait, filters and errors
//! - [`sonarqube`] - SonarQube Web API client
//! - [`mock`] - In-memory tracker for tests
//! - [`retry`] - Backoff for transient read failures
//!
//! # Usage
//!
//! The engine takes an `Arc<dyn IssueTracker>`; the CLI builds a
//! `SonarQubeTracker` from configuration, tests use `MockTracker`.

pub mod mock;
pub mod retry;
pub mod sonarqube;
pub mod traits;

pub use retry::{with_retry, RetryPolicy};
pub use traits::{IssueTracker, SearchFilters, TrackerError, WriteFailure};
