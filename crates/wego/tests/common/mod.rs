//! Shared test utilities for wego integration tests.
//!
//! This module provides:
//! - `TestHarness` with a seeded bare remote and a repository cache
//! - Builders for component objects

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
