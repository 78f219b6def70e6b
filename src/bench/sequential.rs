//! Unbatched writes
//!
//! Every generated item becomes one put, issued on the caller's task. This is
//! the baseline the other strategies are compared against.

use std::path::Path;

use crate::bench::close_after;
use crate::engine::{Backend, Engine, Options, WriteOptions};
use crate::workload::{Env, Progress, Sink, WorkItem};
use crate::Result;

/// Sequential put benchmark
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequentialWrite {
    pub options: Options,
}

impl SequentialWrite {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub async fn benchmark<B: Backend>(
        &self,
        backend: &B,
        dir: &Path,
        env: &mut Env,
    ) -> Result<()> {
        let engine = backend.open(dir, &self.options).await?;
        let mut sink = PutSink {
            engine: &engine,
            progress: env.progress(),
            write: WriteOptions::default(),
        };
        let result = env.run(&mut sink).await;
        close_after(&engine, result).await
    }
}

struct PutSink<'a, E> {
    engine: &'a E,
    progress: Progress,
    write: WriteOptions,
}

impl<E: Engine> Sink for PutSink<'_, E> {
    async fn accept(&mut self, item: WorkItem, _last: bool) -> Result<()> {
        self.engine.put(&item.key, &item.value, &self.write).await?;
        self.progress.add(item.value.len());
        Ok(())
    }
}
