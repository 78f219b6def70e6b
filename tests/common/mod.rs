//! Shared test helpers: an in-memory engine with fault injection.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kvwritebench::engine::{Backend, Batch, Engine, Options, WriteOptions};
use kvwritebench::workload::{Env, WorkloadConfig};
use kvwritebench::{KvBenchError, Result};

/// Everything the mock engine saw
#[derive(Default)]
pub struct MockState {
    pub opened: Mutex<Vec<(PathBuf, Options)>>,
    pub puts: Mutex<Vec<(Vec<u8>, usize)>>,
    pub put_options: Mutex<Vec<WriteOptions>>,
    pub batches: Mutex<Vec<usize>>,
    pub closes: AtomicUsize,
    put_attempts: AtomicUsize,
    batch_attempts: AtomicUsize,
}

/// Backend handing out [`MockEngine`]s that share one [`MockState`]
#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<MockState>,
    pub fail_open: bool,
    /// Fail the n-th put attempt (0-based)
    pub fail_put_at: Option<usize>,
    /// Fail the n-th batch attempt (0-based)
    pub fail_batch_at: Option<usize>,
    pub put_delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn failing_put(n: usize) -> Self {
        Self {
            fail_put_at: Some(n),
            ..Self::default()
        }
    }

    pub fn failing_batch(n: usize) -> Self {
        Self {
            fail_batch_at: Some(n),
            ..Self::default()
        }
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn put_keys(&self) -> Vec<Vec<u8>> {
        self.state
            .puts
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn put_bytes(&self) -> usize {
        self.state.puts.lock().unwrap().iter().map(|(_, v)| v).sum()
    }

    pub fn batches(&self) -> Vec<usize> {
        self.state.batches.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.state.opened.lock().unwrap().len()
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

pub struct MockEngine {
    backend: MockBackend,
}

impl Backend for MockBackend {
    type Handle = MockEngine;

    async fn open(&self, dir: &Path, options: &Options) -> Result<MockEngine> {
        if self.fail_open {
            return Err(KvBenchError::EngineOpen(format!(
                "{}: injected open failure",
                dir.display()
            )));
        }
        self.state
            .opened
            .lock()
            .unwrap()
            .push((dir.to_path_buf(), options.clone()));
        Ok(MockEngine {
            backend: self.clone(),
        })
    }
}

impl Engine for MockEngine {
    async fn put(&self, key: &[u8], value: &[u8], options: &WriteOptions) -> Result<()> {
        let attempt = self.backend.state.put_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.backend.put_delay.is_zero() {
            tokio::time::sleep(self.backend.put_delay).await;
        }
        if self.backend.fail_put_at == Some(attempt) {
            return Err(KvBenchError::EngineWrite(format!(
                "injected failure on put {}",
                attempt
            )));
        }
        self.backend
            .state
            .puts
            .lock()
            .unwrap()
            .push((key.to_vec(), value.len()));
        self.backend
            .state
            .put_options
            .lock()
            .unwrap()
            .push(options.clone());
        Ok(())
    }

    async fn write_batch(&self, batch: &Batch, _options: &WriteOptions) -> Result<()> {
        let attempt = self
            .backend
            .state
            .batch_attempts
            .fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_batch_at == Some(attempt) {
            return Err(KvBenchError::EngineWrite(format!(
                "injected failure on batch {}",
                attempt
            )));
        }
        self.backend
            .state
            .batches
            .lock()
            .unwrap()
            .push(batch.value_bytes());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.backend.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Workload of `size` value bytes in `value_size` pieces with a discarded
/// progress log
pub fn env(size: u64, value_size: u64) -> Env {
    let config = WorkloadConfig {
        size,
        value_size,
        key_size: 16,
        log_percent: 10,
        seed: Some(42),
    };
    Env::new(config, Box::new(std::io::sink())).unwrap()
}
