//! Shared utilities for the vppcfgd integration tests.

pub mod harness;

pub use harness::{fields, platform, state_platform, TestHarness};
