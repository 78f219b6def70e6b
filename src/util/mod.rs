//! Utility functions module
//!
//! Size parsing and human-readable formatting helpers.

pub mod units;

pub use units::{format_bytes, format_duration, format_throughput, parse_size};
