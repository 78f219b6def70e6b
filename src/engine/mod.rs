//! Storage engine contract
//!
//! The benchmark strategies only ever talk to an engine through the
//! [`Backend`] and [`Engine`] traits. Implementations must be safe for
//! parallel puts from many tasks; the concurrent strategy shares one handle
//! across all of its workers and does no locking of its own.

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

pub mod rocks;

pub use rocks::{RocksBackend, RocksStore, StoreStats};

/// Default size above which a batch is split when large batch transactions
/// are disabled.
pub const DEFAULT_WRITE_BUFFER: usize = 4 * 1024 * 1024;

/// Options applied when the engine is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Sync the log to stable storage after every write
    pub sync: bool,
    /// Allow concurrent single-key writes to be coalesced into one append
    pub write_merge: bool,
    /// Apply batches larger than `write_buffer` atomically
    pub large_batch_transaction: bool,
    /// Split size for non-transactional large batches (in bytes)
    pub write_buffer: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sync: true,
            write_merge: true,
            large_batch_transaction: true,
            write_buffer: DEFAULT_WRITE_BUFFER,
        }
    }
}

impl Options {
    /// Disable syncing after every write
    pub fn no_sync(mut self) -> Self {
        self.sync = false;
        self
    }

    /// Disable coalescing of concurrent writes
    pub fn no_write_merge(mut self) -> Self {
        self.write_merge = false;
        self
    }

    /// Let large batches be split into independent writes
    pub fn no_large_batch_transaction(mut self) -> Self {
        self.large_batch_transaction = false;
        self
    }

    /// Set the split size for non-transactional batches
    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer = bytes;
        self
    }
}

/// Per-write options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Overrides `Options::write_merge` for this write when set
    pub write_merge: Option<bool>,
}

impl WriteOptions {
    pub fn with_write_merge(write_merge: bool) -> Self {
        Self {
            write_merge: Some(write_merge),
        }
    }
}

/// An ordered set of puts applied with a single write.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    value_bytes: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.value_bytes += value.len();
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the value lengths of all pending puts
    pub fn value_bytes(&self) -> usize {
        self.value_bytes
    }

    /// Sum of key and value lengths of all pending puts
    pub fn encoded_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.value_bytes = 0;
    }
}

/// An opened storage engine.
pub trait Engine: Send + Sync + 'static {
    /// Store a single key.
    fn put(
        &self,
        key: &[u8],
        value: &[u8],
        options: &WriteOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store every entry of `batch` with one write.
    fn write_batch(
        &self,
        batch: &Batch,
        options: &WriteOptions,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Flush and release the handle.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens engine handles. Failures must be reported as
/// [`KvBenchError::EngineOpen`](crate::KvBenchError::EngineOpen).
pub trait Backend: Send + Sync {
    type Handle: Engine;

    fn open(
        &self,
        dir: &Path,
        options: &Options,
    ) -> impl Future<Output = Result<Self::Handle>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_accounting() {
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        batch.put(b"k1".to_vec(), vec![0u8; 10]);
        batch.put(b"key2".to_vec(), vec![0u8; 5]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.value_bytes(), 15);
        assert_eq!(batch.encoded_bytes(), 21);

        let keys: Vec<&[u8]> = batch.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"k1".as_slice(), b"key2".as_slice()]);

        batch.reset();
        assert!(batch.is_empty());
        assert_eq!(batch.value_bytes(), 0);
    }

    #[test]
    fn test_options_builders() {
        let options = Options::default().no_sync().no_large_batch_transaction();
        assert!(!options.sync);
        assert!(options.write_merge);
        assert!(!options.large_batch_transaction);
        assert_eq!(options.write_buffer, DEFAULT_WRITE_BUFFER);

        let write = WriteOptions::with_write_merge(false);
        assert_eq!(write.write_merge, Some(false));
        assert_eq!(WriteOptions::default().write_merge, None);
    }
}
