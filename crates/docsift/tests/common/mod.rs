//! Shared test utilities for docsift integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a store, orchestrator and service around scripted agents
//! - Builder patterns for configurations and agents

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
