//! core
//!
//! Domain types, content fingerprints and configuration.
//!
//! # Modules
//!
//! - [`types`] - Issue records, changelog entries and attribute changes
//! - [`fingerprint`] - Identifier-independent issue signatures
//! - [`config`] - Configuration schema and loading
//!
//! # Invariants
//!
//! - Nothing past intake handles an issue without key, rule, component,
//!   message and status.
//! - Changelogs are chronologically ordered once hydrated.
//! - Core types perform no I/O.

pub mod config;
pub mod fingerprint;
pub mod types;
