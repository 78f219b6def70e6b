//! Benchmark result data models
//!
//! Contains structures for storing and summarizing the outcome of each named
//! test of a run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::{format_bytes, format_duration, format_throughput};
use crate::util::units::calculate_throughput_mbps;

/// Outcome of one named test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Registry name of the test
    pub name: String,
    /// Timestamp when the test started
    pub timestamp: DateTime<Utc>,
    /// Value bytes reported as written
    pub bytes_written: u64,
    /// Wall time of the strategy invocation
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    /// Throughput in MiB per second
    pub throughput_mbps: f64,
    /// Error message if the test failed
    pub error: Option<String>,
}

impl BenchmarkResult {
    /// Build a result from the measured values; throughput is derived.
    pub fn new(
        name: impl Into<String>,
        timestamp: DateTime<Utc>,
        bytes_written: u64,
        elapsed: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            timestamp,
            bytes_written,
            elapsed,
            throughput_mbps: calculate_throughput_mbps(bytes_written, elapsed),
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get a human-readable summary of the result
    pub fn summary(&self) -> String {
        match &self.error {
            None => format!(
                "{:<20} {:>10} in {:<12} {}",
                self.name,
                format_bytes(self.bytes_written),
                format_duration(self.elapsed),
                format_throughput(self.throughput_mbps)
            ),
            Some(error) => format!(
                "{:<20} FAILED after {} ({}): {}",
                self.name,
                format_bytes(self.bytes_written),
                format_duration(self.elapsed),
                error
            ),
        }
    }
}

/// Results of every test of a run, in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<BenchmarkResult>,
}

impl RunReport {
    pub fn push(&mut self, result: BenchmarkResult) {
        self.results.push(result);
    }

    /// Tests that ended with an error
    pub fn failed(&self) -> Vec<&BenchmarkResult> {
        self.results.iter().filter(|r| !r.is_success()).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(BenchmarkResult::is_success)
    }

    pub fn get(&self, name: &str) -> Option<&BenchmarkResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// One line per test
    pub fn summary(&self) -> String {
        self.results
            .iter()
            .map(BenchmarkResult::summary)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
