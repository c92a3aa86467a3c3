//! Shared test utilities for callscribe integration tests.
//!
//! This module provides:
//! - `TestHarness` with a temp calls folder, an in-memory catalog and fake engines
//! - `FakeRuntime` standing in for the execution runtime
//! - Builders for configs and catalog rows

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{engines, FakeRuntime, ScriptedTranscriber, TestHarness};
