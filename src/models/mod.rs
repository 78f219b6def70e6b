//! Data models module
//!
//! Contains the per-test result record produced by the runner.

pub mod result;

// Re-export commonly used types
pub use result::{BenchmarkResult, RunReport};
