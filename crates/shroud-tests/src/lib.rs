//! Integration tests for the shroud workspace.
//!
//! This crate provides:
//! - A fault-injecting chunk store for failure-path tests
//! - Deterministic test data and small engine configurations
//! - Cross-crate tests under `tests/`

pub mod harness;

pub use harness::{random_bytes, small_config, FlakyStore, Fault};
