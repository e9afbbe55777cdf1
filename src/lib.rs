//! Profile harness - end-to-end tests for a profiling toolchain
//!
//! This library provides the building blocks of the harness: remote
//! execution, scenario loading, application launching, the toolchain
//! contract and a structural diff engine.

pub mod app;
pub mod cli;
pub mod commands;
pub mod common;
pub mod diff;
pub mod remote;
pub mod scenario;
pub mod testing;
pub mod toolchain;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use diff::{diff, Comparable, DivergenceReport};
