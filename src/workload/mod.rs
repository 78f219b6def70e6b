//! Workload generation
//!
//! [`Env`] produces the key/value pairs of one benchmark run and hands them,
//! one at a time, to a [`Sink`] supplied by the strategy under test.

use std::future::Future;
use std::io::Write;

use rand::distributions::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KvBenchError, Result};

pub mod progress;

pub use progress::{Progress, ProgressRecord};

/// Widest counter suffix placed at the end of generated keys
const KEY_COUNTER_WIDTH: usize = 16;
/// Smallest key size that still yields unique keys for any realistic run
pub const MIN_KEY_SIZE: u64 = 8;

/// One generated key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl WorkItem {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Consumer of generated items
///
/// `accept` is called once per item; `last` is set on exactly one final call.
/// Returning an error stops the workload.
pub trait Sink: Send {
    fn accept(&mut self, item: WorkItem, last: bool) -> impl Future<Output = Result<()>> + Send;
}

/// Shape of the generated workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Total value bytes to generate
    pub size: u64,
    /// Size of each value (in bytes)
    pub value_size: u64,
    /// Size of each key (in bytes)
    pub key_size: u64,
    /// Log a progress record every this many percent of `size`
    pub log_percent: u8,
    /// Seed for reproducible keys and values
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            size: 500 * 1024 * 1024,
            value_size: 100,
            key_size: 32,
            log_percent: 1,
            seed: None,
        }
    }
}

impl WorkloadConfig {
    /// Number of items the workload will produce
    pub fn item_count(&self) -> u64 {
        if self.value_size == 0 {
            return 0;
        }
        self.size.div_ceil(self.value_size)
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(KvBenchError::ConfigError(
                "Size must be greater than 0".to_string(),
            ));
        }
        if self.value_size == 0 {
            return Err(KvBenchError::ConfigError(
                "Value size must be greater than 0".to_string(),
            ));
        }
        if self.key_size < MIN_KEY_SIZE {
            return Err(KvBenchError::ConfigError(format!(
                "Key size must be at least {} bytes",
                MIN_KEY_SIZE
            )));
        }
        if self.log_percent == 0 || self.log_percent > 100 {
            return Err(KvBenchError::ConfigError(
                "Log percent must be between 1 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Workload driver of one benchmark run
pub struct Env {
    config: WorkloadConfig,
    progress: Progress,
    rng: SmallRng,
}

impl Env {
    /// Create a driver writing its progress records to `log`.
    pub fn new(config: WorkloadConfig, log: Box<dyn Write + Send>) -> Result<Self> {
        config.validate()?;
        let progress = Progress::new(config.size, config.log_percent, log);
        Ok(Self::with_progress(config, progress))
    }

    /// Create a driver around an existing progress handle.
    pub fn with_progress(config: WorkloadConfig, progress: Progress) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            config,
            progress,
            rng,
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Handle strategies use to report written bytes
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Feed every generated item to `sink`, stopping at the first error or
    /// after the item flagged as last.
    pub async fn run<S: Sink>(&mut self, sink: &mut S) -> Result<()> {
        let count = self.config.item_count();
        debug!(items = count, size = self.config.size, "starting workload");
        self.progress.start();

        let mut written = 0u64;
        let mut index = 0u64;
        while written < self.config.size {
            let item = self.next_item(index);
            written += item.value.len() as u64;
            let last = written >= self.config.size;
            sink.accept(item, last).await?;
            index += 1;
        }

        self.progress.finish()
    }

    fn next_item(&mut self, index: u64) -> WorkItem {
        let key_size = self.config.key_size as usize;
        let mut key = self.random_bytes(key_size);
        let width = key_size.min(KEY_COUNTER_WIDTH);
        let counter = format!("{:0width$x}", index, width = KEY_COUNTER_WIDTH);
        let counter = &counter.as_bytes()[counter.len() - width..];
        key[key_size - width..].copy_from_slice(counter);

        let value = self.random_bytes(self.config.value_size as usize);
        WorkItem { key, value }
    }

    fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        (&mut self.rng).sample_iter(Alphanumeric).take(len).collect()
    }
}
