//! Diagnostic logging setup
//!
//! Diagnostics go through `tracing` to stderr. The per-test progress records
//! are separate and are written by [`crate::workload::Progress`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{KvBenchError, Result};

/// Log format style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line format (default)
    #[default]
    Compact,
    /// Multi-line, human-readable format
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LogConfig {
    pub fn info() -> Self {
        Self::default()
    }

    pub fn debug() -> Self {
        Self::default().with_level("debug")
    }

    /// Info level, or debug when `verbose` is set
    pub fn verbosity(verbose: bool) -> Self {
        if verbose {
            Self::debug()
        } else {
            Self::info()
        }
    }

    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// `RUST_LOG` if set and valid, otherwise the configured level
    pub fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| {
                KvBenchError::ConfigError(format!("invalid log level {:?}: {}", self.level, e))
            })
    }

    /// Install the global subscriber. Fails if one is already installed.
    pub fn init(self) -> Result<()> {
        let filter = self.filter()?;
        let registry = tracing_subscriber::registry().with(filter);
        let installed = match self.format {
            LogFormat::Compact => registry
                .with(fmt::layer().with_writer(std::io::stderr).compact())
                .try_init(),
            LogFormat::Pretty => registry
                .with(fmt::layer().with_writer(std::io::stderr).pretty())
                .try_init(),
        };
        installed.map_err(|e| KvBenchError::LogError(format!("logging setup failed: {}", e)))
    }
}
