//! Batched writes
//!
//! Items are accumulated until their values add up to the batch size (or the
//! workload ends) and then written with one batch write.

use std::path::Path;

use tracing::debug;

use crate::bench::close_after;
use crate::engine::{Backend, Batch, Engine, Options, WriteOptions};
use crate::workload::{Env, Progress, Sink, WorkItem};
use crate::Result;

/// Batch write benchmark
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    pub options: Options,
    /// Flush once this many value bytes are pending
    pub batch_size: usize,
}

impl BatchWrite {
    pub fn new(batch_size: usize, options: Options) -> Self {
        Self {
            options,
            batch_size,
        }
    }

    pub async fn benchmark<B: Backend>(
        &self,
        backend: &B,
        dir: &Path,
        env: &mut Env,
    ) -> Result<()> {
        let engine = backend.open(dir, &self.options).await?;
        let mut sink = BatchSink::new(&engine, env.progress(), self.batch_size);
        let result = env.run(&mut sink).await;
        debug!(flushes = sink.flushes, "batched run finished");
        close_after(&engine, result).await
    }
}

pub(crate) struct BatchSink<'a, E> {
    engine: &'a E,
    progress: Progress,
    write: WriteOptions,
    batch: Batch,
    batch_size: usize,
    flushes: u64,
}

impl<'a, E: Engine> BatchSink<'a, E> {
    pub(crate) fn new(engine: &'a E, progress: Progress, batch_size: usize) -> Self {
        Self {
            engine,
            progress,
            write: WriteOptions::default(),
            batch: Batch::new(),
            batch_size,
            flushes: 0,
        }
    }

    /// Write out the pending batch. The batch is cleared even when the write
    /// fails.
    async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let bytes = self.batch.value_bytes();
        let result = self.engine.write_batch(&self.batch, &self.write).await;
        self.batch.reset();
        result?;
        self.flushes += 1;
        self.progress.add(bytes);
        Ok(())
    }
}

impl<E: Engine> Sink for BatchSink<'_, E> {
    async fn accept(&mut self, item: WorkItem, last: bool) -> Result<()> {
        self.batch.put(item.key, item.value);
        if self.batch.value_bytes() >= self.batch_size || last {
            self.flush().await?;
        }
        Ok(())
    }
}
