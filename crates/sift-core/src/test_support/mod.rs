//! Test doubles for the storage collaborators.
//!
//! Available to this crate's tests and to dependents enabling the
//! `test-utils` feature.

pub mod mocks;

pub use mocks::{MockEntityStore, MockStats, MockTransaction};
