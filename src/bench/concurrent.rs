//! Concurrent writes
//!
//! Generated items are handed to a [`Coordinator`] whose workers put them into
//! one shared engine. The workload stops feeding as soon as a worker fails.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::bench::close_after;
use crate::bench::worker::{Coordinator, Submit, WorkerInfo};
use crate::engine::{Backend, Options, WriteOptions};
use crate::workload::{Env, Sink, WorkItem};
use crate::{KvBenchError, Result};

/// Concurrent put benchmark
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentWrite {
    pub options: Options,
    /// Number of write workers
    pub workers: usize,
    /// Let the engine merge concurrent puts into one commit
    pub write_merge: bool,
}

/// Outcome of a concurrent run together with the final worker states
#[derive(Debug)]
pub struct ConcurrentReport {
    pub result: Result<()>,
    pub workers: Vec<WorkerInfo>,
}

impl ConcurrentWrite {
    pub fn new(workers: usize, write_merge: bool, options: Options) -> Self {
        Self {
            options,
            workers: workers.max(1),
            write_merge,
        }
    }

    pub async fn benchmark<B: Backend>(
        &self,
        backend: &B,
        dir: &Path,
        env: &mut Env,
    ) -> Result<()> {
        self.execute(backend, dir, env).await.result
    }

    /// Run the benchmark and keep the per-worker summary. When the engine
    /// cannot be opened no worker is started and the list is empty.
    pub async fn execute<B: Backend>(
        &self,
        backend: &B,
        dir: &Path,
        env: &mut Env,
    ) -> ConcurrentReport {
        let engine = match backend.open(dir, &self.options).await {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                return ConcurrentReport {
                    result: Err(e),
                    workers: Vec::new(),
                }
            }
        };

        let coordinator = Coordinator::start(
            Arc::clone(&engine),
            self.workers,
            WriteOptions::with_write_merge(self.write_merge),
            env.progress(),
        );
        let mut sink = ConcurrentSink {
            coordinator,
            submitted: 0,
        };

        let run = env.run(&mut sink).await;
        // the sink has already shut down on the last item; this only matters
        // when the workload stopped early
        let shutdown = sink.coordinator.shutdown().await;
        let result = run.and(shutdown);

        let workers = sink.coordinator.workers();
        info!(
            workers = workers.len(),
            submitted = sink.submitted,
            ok = result.is_ok(),
            "concurrent run finished"
        );

        ConcurrentReport {
            result: close_after(&*engine, result).await,
            workers,
        }
    }
}

struct ConcurrentSink {
    coordinator: Coordinator,
    submitted: u64,
}

impl Sink for ConcurrentSink {
    async fn accept(&mut self, item: WorkItem, last: bool) -> Result<()> {
        match self.coordinator.submit(item).await {
            Submit::Queued => {
                self.submitted += 1;
                if last {
                    return self.coordinator.shutdown().await;
                }
                Ok(())
            }
            Submit::Cancelled => {
                debug!(submitted = self.submitted, "workers cancelled, stopping producer");
                self.coordinator.shutdown().await?;
                Err(KvBenchError::WorkerError(
                    "workers cancelled before the workload finished".to_string(),
                ))
            }
        }
    }
}
