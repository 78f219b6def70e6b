//! Configuration management module
//!
//! Handles loading, saving, and validation of benchmark run settings. A
//! configuration file is TOML; sizes may be written either as plain byte
//! counts or as strings such as `"500mb"`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::workload::WorkloadConfig;
use crate::{KvBenchError, Result};

/// Benchmark configuration structure containing all run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Names of the tests to run, in order
    pub tests: Vec<String>,
    /// Total value bytes written by each test
    #[serde(with = "size_serde")]
    pub size: u64,
    /// Size of each value (in bytes)
    #[serde(with = "size_serde")]
    pub value_size: u64,
    /// Size of each key (in bytes)
    #[serde(with = "size_serde")]
    pub key_size: u64,
    /// Parent directory of the per-test engine directories
    pub dir: PathBuf,
    /// Directory receiving the per-test progress logs
    pub log_dir: PathBuf,
    /// Progress record interval, in percent of `size`
    pub log_percent: u8,
    /// Seed for reproducible workloads
    pub seed: Option<u64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        let workload = WorkloadConfig::default();
        Self {
            tests: Vec::new(),
            size: workload.size,
            value_size: workload.value_size,
            key_size: workload.key_size,
            dir: PathBuf::from("."),
            log_dir: PathBuf::from("."),
            log_percent: workload.log_percent,
            seed: None,
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.tests.is_empty() {
            return Err(KvBenchError::ConfigError(
                "no tests to run, use --test to select tests".to_string(),
            ));
        }
        if self.tests.iter().any(|name| name.trim().is_empty()) {
            return Err(KvBenchError::ConfigError(
                "Test names must not be empty".to_string(),
            ));
        }
        self.workload().validate()
    }

    /// Workload shape shared by every test of the run
    pub fn workload(&self) -> WorkloadConfig {
        WorkloadConfig {
            size: self.size,
            value_size: self.value_size,
            key_size: self.key_size,
            log_percent: self.log_percent,
            seed: self.seed,
        }
    }

    /// Engine directory of one test
    pub fn engine_dir(&self, test: &str) -> PathBuf {
        self.dir.join(format!("{}{}", crate::TESTDB_PREFIX, test))
    }

    /// Progress log file of one test
    pub fn log_file(&self, test: &str) -> PathBuf {
        self.log_dir
            .join(format!("{}.{}", test, crate::LOG_FILE_EXTENSION))
    }

    pub fn with_tests(mut self, tests: Vec<String>) -> Self {
        self.tests = tests;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_value_size(mut self, size: u64) -> Self {
        self.value_size = size;
        self
    }

    pub fn with_key_size(mut self, size: u64) -> Self {
        self.key_size = size;
        self
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn with_log_percent(mut self, percent: u8) -> Self {
        self.log_percent = percent;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Load and validate a configuration file. Missing keys take their
    /// default values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            KvBenchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            KvBenchError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                KvBenchError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            KvBenchError::ConfigError(format!("Failed to serialize configuration: {}", e))
        })?;

        fs::write(path, content).map_err(|e| {
            KvBenchError::ConfigError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Sizes are written as integers and read from integers or size strings.
mod size_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSize {
        Bytes(u64),
        Text(String),
    }

    pub fn serialize<S>(size: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(*size)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawSize::deserialize(deserializer)? {
            RawSize::Bytes(bytes) => Ok(bytes),
            RawSize::Text(text) => {
                crate::util::parse_size(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}
