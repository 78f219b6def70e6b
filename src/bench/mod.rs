//! Benchmark strategies
//!
//! A [`Strategy`] opens an engine, drives the workload through it with one
//! write pattern, and reports progress. The three variants share nothing but
//! this entry point.

use std::path::Path;

use tracing::warn;

use crate::engine::{Backend, Engine, Options};
use crate::workload::Env;
use crate::Result;

pub mod batched;
pub mod concurrent;
pub mod registry;
pub mod sequential;
pub mod worker;

// Re-export commonly used types
pub use batched::BatchWrite;
pub use concurrent::{ConcurrentReport, ConcurrentWrite};
pub use registry::Registry;
pub use sequential::SequentialWrite;
pub use worker::{CancelSignal, Coordinator, Submit, WorkerInfo, WorkerStatus};

/// One write pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// One put per item
    Sequential(SequentialWrite),
    /// Items accumulated and written as batches
    Batched(BatchWrite),
    /// Puts spread over a pool of workers
    Concurrent(ConcurrentWrite),
}

impl Strategy {
    pub fn sequential(options: Options) -> Self {
        Strategy::Sequential(SequentialWrite::new(options))
    }

    pub fn batched(batch_size: usize, options: Options) -> Self {
        Strategy::Batched(BatchWrite::new(batch_size, options))
    }

    pub fn concurrent(workers: usize, write_merge: bool, options: Options) -> Self {
        Strategy::Concurrent(ConcurrentWrite::new(workers, write_merge, options))
    }

    /// Engine options the strategy opens its engine with
    pub fn options(&self) -> &Options {
        match self {
            Strategy::Sequential(s) => &s.options,
            Strategy::Batched(s) => &s.options,
            Strategy::Concurrent(s) => &s.options,
        }
    }

    /// Get a human-readable description of the strategy
    pub fn description(&self) -> String {
        let options = self.options();
        let mut text = match self {
            Strategy::Sequential(_) => "sequential puts".to_string(),
            Strategy::Batched(s) => format!(
                "batches of {}",
                crate::util::format_bytes(s.batch_size as u64)
            ),
            Strategy::Concurrent(s) => format!(
                "{} concurrent writers{}",
                s.workers,
                if s.write_merge { "" } else { ", no write merge" }
            ),
        };
        if !options.sync {
            text.push_str(", no sync");
        }
        if !options.large_batch_transaction {
            text.push_str(", no large batch transaction");
        }
        text
    }

    /// Run the workload in `env` against an engine opened at `dir`.
    pub async fn benchmark<B: Backend>(
        &self,
        backend: &B,
        dir: &Path,
        env: &mut Env,
    ) -> Result<()> {
        match self {
            Strategy::Sequential(s) => s.benchmark(backend, dir, env).await,
            Strategy::Batched(s) => s.benchmark(backend, dir, env).await,
            Strategy::Concurrent(s) => s.benchmark(backend, dir, env).await,
        }
    }
}

/// Close `engine`, keeping the run's error if there was one.
pub(crate) async fn close_after<E: Engine>(engine: &E, result: Result<()>) -> Result<()> {
    let closed = engine.close().await;
    match result {
        Err(e) => {
            if let Err(close_err) = closed {
                warn!("closing engine after failed run: {}", close_err);
            }
            Err(e)
        }
        Ok(()) => closed,
    }
}
