//! RocksDB engine
//!
//! Every write goes through a `rocksdb::WriteBatch` on tokio's blocking pool.
//! How the engine options map onto RocksDB:
//!
//! - `sync` sets `WriteOptions::set_sync` on every write.
//! - `write_buffer` sets the memtable size and is also the split size below.
//! - `large_batch_transaction` off: a batch whose encoded size exceeds
//!   `write_buffer` is written as several independent `WriteBatch`es.
//! - `write_merge`: RocksDB always lets a leader writer commit the writers
//!   queued behind it as one group and has no switch for it. With merging off,
//!   writes are serialized through a store-wide lock so no group can form.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rocksdb::{IteratorMode, Options as DbOptions, WriteBatch, WriteOptions as DbWriteOptions, DB};
use tracing::debug;

use crate::engine::{Backend, Batch, Engine, Options, WriteOptions};
use crate::{KvBenchError, Result};

/// Counters describing how writes reached RocksDB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of `WriteBatch`es handed to RocksDB
    pub writes: u64,
    /// Writes issued with `sync` set
    pub synced: u64,
    /// Number of key/value entries written
    pub records: u64,
}

struct Inner {
    db: DB,
    sync: bool,
    serial: Mutex<()>,
    writes: AtomicU64,
    synced: AtomicU64,
    records: AtomicU64,
}

impl Inner {
    fn write(&self, batch: WriteBatch, merge: bool) -> std::result::Result<(), rocksdb::Error> {
        let records = batch.len() as u64;
        let mut write_options = DbWriteOptions::default();
        write_options.set_sync(self.sync);

        if merge {
            self.db.write_opt(batch, &write_options)?;
        } else {
            let _serial = self.serial.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.db.write_opt(batch, &write_options)?;
        }

        self.writes.fetch_add(1, Ordering::Relaxed);
        if self.sync {
            self.synced.fetch_add(1, Ordering::Relaxed);
        }
        self.records.fetch_add(records, Ordering::Relaxed);
        Ok(())
    }
}

/// An open RocksDB database
pub struct RocksStore {
    path: PathBuf,
    options: Options,
    inner: Arc<Inner>,
}

impl RocksStore {
    /// Open or create the database in `dir`, creating missing parents.
    pub async fn open(dir: &Path, options: &Options) -> Result<Self> {
        let path = dir.to_path_buf();
        let mut db_options = DbOptions::default();
        db_options.create_if_missing(true);
        db_options.set_write_buffer_size(options.write_buffer);

        let open_path = path.clone();
        let opened = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&open_path).map_err(|e| e.to_string())?;
            DB::open(&db_options, &open_path).map_err(|e| e.to_string())
        })
        .await;
        let db = match opened {
            Ok(Ok(db)) => db,
            Ok(Err(msg)) => return Err(open_error(&path, msg)),
            Err(e) => return Err(open_error(&path, e.to_string())),
        };
        debug!(path = %path.display(), sync = options.sync, "opened rocksdb");

        Ok(Self {
            path,
            options: options.clone(),
            inner: Arc::new(Inner {
                db,
                sync: options.sync,
                serial: Mutex::new(()),
                writes: AtomicU64::new(0),
                synced: AtomicU64::new(0),
                records: AtomicU64::new(0),
            }),
        })
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = Arc::clone(&self.inner);
        let key = key.to_vec();
        blocking(move || inner.db.get(&key))
            .await
            .map_err(|msg| write_error(&self.path, msg))
    }

    /// Number of keys, counted by a full scan
    pub async fn key_count(&self) -> Result<usize> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let mut count = 0usize;
            for entry in inner.db.iterator(IteratorMode::Start) {
                entry?;
                count += 1;
            }
            Ok(count)
        })
        .await
        .map_err(|msg| write_error(&self.path, msg))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            writes: self.inner.writes.load(Ordering::Relaxed),
            synced: self.inner.synced.load(Ordering::Relaxed),
            records: self.inner.records.load(Ordering::Relaxed),
        }
    }

    /// Entries of `batch` grouped into the `WriteBatch`es it is written as.
    fn chunks(&self, batch: &Batch) -> Vec<Vec<(Vec<u8>, Vec<u8>)>> {
        let split = !self.options.large_batch_transaction
            && batch.encoded_bytes() > self.options.write_buffer;
        let limit = if split {
            self.options.write_buffer.max(1)
        } else {
            usize::MAX
        };

        let mut chunks = Vec::new();
        let mut chunk = Vec::new();
        let mut chunk_bytes = 0usize;
        for (key, value) in batch.iter() {
            chunk_bytes += key.len() + value.len();
            chunk.push((key.to_vec(), value.to_vec()));
            if chunk_bytes >= limit {
                chunks.push(std::mem::take(&mut chunk));
                chunk_bytes = 0;
            }
        }
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        chunks
    }
}

impl Engine for RocksStore {
    async fn put(&self, key: &[u8], value: &[u8], options: &WriteOptions) -> Result<()> {
        let merge = options.write_merge.unwrap_or(self.options.write_merge);
        let inner = Arc::clone(&self.inner);
        let (key, value) = (key.to_vec(), value.to_vec());
        blocking(move || {
            let mut batch = WriteBatch::default();
            batch.put(&key, &value);
            inner.write(batch, merge)
        })
        .await
        .map_err(|msg| write_error(&self.path, msg))
    }

    async fn write_batch(&self, batch: &Batch, options: &WriteOptions) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let merge = options.write_merge.unwrap_or(self.options.write_merge);
        let chunks = self.chunks(batch);
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            for chunk in chunks {
                let mut write = WriteBatch::default();
                for (key, value) in &chunk {
                    write.put(key, value);
                }
                inner.write(write, merge)?;
            }
            Ok(())
        })
        .await
        .map_err(|msg| write_error(&self.path, msg))
    }

    async fn close(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.db.flush())
            .await
            .map_err(|msg| write_error(&self.path, msg))?;
        debug!(path = %self.path.display(), stats = ?self.stats(), "closed rocksdb");
        Ok(())
    }
}

/// Opens [`RocksStore`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocksBackend;

impl Backend for RocksBackend {
    type Handle = RocksStore;

    async fn open(&self, dir: &Path, options: &Options) -> Result<RocksStore> {
        RocksStore::open(dir, options).await
    }
}

/// Run a RocksDB call on the blocking pool.
async fn blocking<T, F>(call: F) -> std::result::Result<T, String>
where
    F: FnOnce() -> std::result::Result<T, rocksdb::Error> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("engine task failed: {}", e)),
    }
}

fn open_error(dir: &Path, msg: String) -> KvBenchError {
    KvBenchError::EngineOpen(format!("{}: {}", dir.display(), msg))
}

fn write_error(path: &Path, msg: String) -> KvBenchError {
    KvBenchError::EngineWrite(format!("{}: {}", path.display(), msg))
}
