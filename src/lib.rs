//! kvwritebench - key-value store write benchmark
//!
//! Drives a key-value storage engine with one of several write strategies
//! (unbatched, batched, concurrent) under a generated workload and records
//! throughput and progress for later comparison.

use std::fmt;

pub mod bench;
pub mod config;
pub mod engine;
pub mod logging;
pub mod models;
pub mod runner;
pub mod util;
pub mod workload;

// Common error types
#[derive(Debug)]
pub enum KvBenchError {
    /// The storage engine could not be opened at the given directory
    EngineOpen(String),
    /// A put or batch write was rejected by the storage engine
    EngineWrite(String),
    /// Unknown benchmark name, bad size string or invalid settings
    ConfigError(String),
    /// I/O outside the engine (log files, directories)
    IoError(std::io::Error),
    /// Progress log could not be written or encoded
    LogError(String),
    /// A worker task panicked or was aborted
    WorkerError(String),
}

impl fmt::Display for KvBenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvBenchError::EngineOpen(msg) => write!(f, "Engine open error: {}", msg),
            KvBenchError::EngineWrite(msg) => write!(f, "Engine write error: {}", msg),
            KvBenchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            KvBenchError::IoError(err) => write!(f, "I/O error: {}", err),
            KvBenchError::LogError(msg) => write!(f, "Progress log error: {}", msg),
            KvBenchError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
        }
    }
}

impl std::error::Error for KvBenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KvBenchError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KvBenchError {
    fn from(err: std::io::Error) -> Self {
        KvBenchError::IoError(err)
    }
}

impl From<serde_json::Error> for KvBenchError {
    fn from(err: serde_json::Error) -> Self {
        KvBenchError::LogError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for KvBenchError {
    fn from(err: toml::de::Error) -> Self {
        KvBenchError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, KvBenchError>;

/// Error handling utilities
pub mod error {
    use super::KvBenchError;

    /// Whether the error happened before any engine was touched.
    pub fn is_startup_error(error: &KvBenchError) -> bool {
        matches!(error, KvBenchError::ConfigError(_))
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &KvBenchError) -> String {
        match error {
            KvBenchError::EngineOpen(msg) => {
                format!(
                    "Could not open the database ({}). Check that --dir exists and is writable.",
                    msg
                )
            }
            KvBenchError::EngineWrite(msg) => {
                format!(
                    "A write failed ({}). The measurement for this test is invalid.",
                    msg
                )
            }
            KvBenchError::ConfigError(msg) => {
                format!("Configuration error: {}. Use --list to see the available tests.", msg)
            }
            KvBenchError::IoError(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                "Permission denied. Check permissions of --dir and --logdir.".to_string()
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "kvwritebench";
/// Engine directories are created as `<dir>/testdb-<name>`.
pub const TESTDB_PREFIX: &str = "testdb-";
pub const LOG_FILE_EXTENSION: &str = "json";
