//! Concurrent write coordination
//!
//! A [`Coordinator`] owns a bounded hand-off queue and a fixed pool of worker
//! tasks that apply puts to a shared engine. The producer side blocks while
//! the queue is full. Closing the queue lets the workers drain what is left
//! and stop; the [`CancelSignal`] stops them without draining and is fired by
//! the first worker that fails. Only the first worker error is kept.
//!
//! The engine is shared by all workers without extra locking; it must handle
//! parallel puts on its own.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{Engine, WriteOptions};
use crate::workload::{Progress, WorkItem};
use crate::{KvBenchError, Result};

/// Worker status for tracking individual worker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Waiting for the next item
    Idle,
    /// Applying an item to the engine
    Writing,
    /// Exited; terminal
    Stopped,
}

impl WorkerStatus {
    fn as_u8(self) -> u8 {
        match self {
            WorkerStatus::Idle => 0,
            WorkerStatus::Writing => 1,
            WorkerStatus::Stopped => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Writing,
            _ => WorkerStatus::Stopped,
        }
    }
}

/// Snapshot of one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Unique worker ID
    pub id: usize,
    /// Current status of the worker
    pub status: WorkerStatus,
    /// Items this worker applied
    pub items_written: u64,
    /// Value bytes this worker applied
    pub bytes_written: u64,
}

impl WorkerInfo {
    /// Check if the worker is busy with a write
    pub fn is_active(&self) -> bool {
        matches!(self.status, WorkerStatus::Writing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.status, WorkerStatus::Stopped)
    }
}

struct WorkerSlot {
    status: AtomicU8,
    items: AtomicU64,
    bytes: AtomicU64,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(WorkerStatus::Idle.as_u8()),
            items: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Move to `next` unless already stopped.
    fn set(&self, next: WorkerStatus) {
        let _ = self
            .status
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current == WorkerStatus::Stopped.as_u8() {
                    None
                } else {
                    Some(next.as_u8())
                }
            });
    }

    fn record(&self, bytes: usize) {
        self.items.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes as u64, Ordering::SeqCst);
    }

    fn info(&self, id: usize) -> WorkerInfo {
        WorkerInfo {
            id,
            status: self.status(),
            items_written: self.items.load(Ordering::SeqCst),
            bytes_written: self.bytes.load(Ordering::SeqCst),
        }
    }
}

/// Broadcast, idempotent cancellation token
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns true only for the call that fired it.
    pub fn cancel(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Outcome of handing one item to the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// The item is in the queue
    Queued,
    /// Cancellation was observed; the item was not queued
    Cancelled,
}

type FirstError = Arc<SyncMutex<Option<KvBenchError>>>;

fn record_error(first: &SyncMutex<Option<KvBenchError>>, err: KvBenchError) {
    let mut slot = first.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match *slot {
        None => *slot = Some(err),
        Some(_) => debug!("discarding later worker error: {}", err),
    }
}

struct Worker<E> {
    id: usize,
    engine: Arc<E>,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    cancel: CancelSignal,
    write: WriteOptions,
    progress: Progress,
    slot: Arc<WorkerSlot>,
    first_error: FirstError,
}

impl<E: Engine> Worker<E> {
    async fn run(self) {
        if let Err(e) = self.write_loop().await {
            warn!(worker = self.id, "write failed, cancelling workers: {}", e);
            record_error(&self.first_error, e);
            self.cancel.cancel();
        }
        self.slot.set(WorkerStatus::Stopped);
        debug!(worker = self.id, items = self.slot.items.load(Ordering::SeqCst), "worker stopped");
    }

    async fn write_loop(&self) -> Result<()> {
        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                item = next_item(&self.queue) => item,
            };
            // queue closed and drained
            let Some(item) = item else {
                return Ok(());
            };

            self.slot.set(WorkerStatus::Writing);
            self.engine.put(&item.key, &item.value, &self.write).await?;
            self.progress.add(item.value.len());
            self.slot.record(item.value.len());
            self.slot.set(WorkerStatus::Idle);
        }
    }
}

async fn next_item(queue: &Mutex<mpsc::Receiver<WorkItem>>) -> Option<WorkItem> {
    queue.lock().await.recv().await
}

/// Bounded hand-off queue plus worker pool
pub struct Coordinator {
    sender: Option<mpsc::Sender<WorkItem>>,
    cancel: CancelSignal,
    slots: Vec<Arc<WorkerSlot>>,
    handles: Vec<JoinHandle<()>>,
    first_error: FirstError,
}

impl Coordinator {
    /// Spawn `workers` tasks (at least one) writing to `engine`. The queue
    /// holds as many items as there are workers.
    pub fn start<E: Engine>(
        engine: Arc<E>,
        workers: usize,
        write: WriteOptions,
        progress: Progress,
    ) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(workers);
        let queue = Arc::new(Mutex::new(receiver));
        let cancel = CancelSignal::new();
        let first_error: FirstError = Arc::new(SyncMutex::new(None));

        let mut slots = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let slot = Arc::new(WorkerSlot::new());
            let worker = Worker {
                id,
                engine: Arc::clone(&engine),
                queue: Arc::clone(&queue),
                cancel: cancel.clone(),
                write: write.clone(),
                progress: progress.clone(),
                slot: Arc::clone(&slot),
                first_error: Arc::clone(&first_error),
            };
            handles.push(tokio::spawn(worker.run()));
            slots.push(slot);
        }
        debug!(workers, "spawned write workers");

        Self {
            sender: Some(sender),
            cancel,
            slots,
            handles,
            first_error,
        }
    }

    /// Number of workers spawned by `start`
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Queue an item, waiting for space. Gives up as soon as cancellation is
    /// observed or the queue is closed.
    pub async fn submit(&self, item: WorkItem) -> Submit {
        let Some(sender) = &self.sender else {
            return Submit::Cancelled;
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Submit::Cancelled,
            sent = sender.send(item) => match sent {
                Ok(()) => Submit::Queued,
                Err(_) => Submit::Cancelled,
            },
        }
    }

    /// Handle to the shared cancellation token
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Stop all workers without draining the queue.
    pub fn cancel_all(&self) {
        if self.cancel.cancel() {
            debug!("cancelled all workers");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current worker statuses
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.slots
            .iter()
            .enumerate()
            .map(|(id, slot)| slot.info(id))
            .collect()
    }

    /// Check if all workers have stopped
    pub fn all_workers_stopped(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| slot.status() == WorkerStatus::Stopped)
    }

    /// Close the queue, wait for every worker to exit and return the first
    /// worker error. Later calls return `Ok(())`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.sender.take();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                record_error(
                    &self.first_error,
                    KvBenchError::WorkerError(format!("worker task failed: {}", e)),
                );
            }
        }
        let first = self
            .first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.cancel.cancel();
            for handle in &self.handles {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Batch;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Engine that remembers every put and can fail on one key
    #[derive(Default)]
    struct RecordingEngine {
        puts: SyncMutex<Vec<Vec<u8>>>,
        fail_on: Option<Vec<u8>>,
        delay: Duration,
    }

    impl Engine for RecordingEngine {
        async fn put(&self, key: &[u8], _value: &[u8], _options: &WriteOptions) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_on.as_deref() == Some(key) {
                return Err(KvBenchError::EngineWrite("injected failure".to_string()));
            }
            self.puts.lock().unwrap().push(key.to_vec());
            Ok(())
        }

        async fn write_batch(&self, _batch: &Batch, _options: &WriteOptions) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn item(i: usize) -> WorkItem {
        WorkItem::new(format!("key-{:04}", i).into_bytes(), vec![b'v'; 10])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_item_applied_once() {
        let engine = Arc::new(RecordingEngine::default());
        let progress = Progress::sink(0);
        let mut coordinator =
            Coordinator::start(Arc::clone(&engine), 8, WriteOptions::default(), progress.clone());
        assert_eq!(coordinator.worker_count(), 8);

        for i in 0..500 {
            assert_eq!(coordinator.submit(item(i)).await, Submit::Queued);
        }
        coordinator.shutdown().await.unwrap();

        let puts = engine.puts.lock().unwrap().clone();
        assert_eq!(puts.len(), 500);
        let distinct: HashSet<_> = puts.iter().collect();
        assert_eq!(distinct.len(), 500);
        assert_eq!(progress.written(), 5000);

        let workers = coordinator.workers();
        assert_eq!(workers.len(), 8);
        assert!(workers.iter().all(|w| w.is_stopped()));
        assert_eq!(workers.iter().map(|w| w.items_written).sum::<u64>(), 500);
        assert!(coordinator.all_workers_stopped());
    }

    #[tokio::test]
    async fn test_single_worker_keeps_order() {
        let engine = Arc::new(RecordingEngine::default());
        let mut coordinator =
            Coordinator::start(Arc::clone(&engine), 1, WriteOptions::default(), Progress::sink(0));

        for i in 0..3 {
            assert_eq!(coordinator.submit(item(i)).await, Submit::Queued);
        }
        coordinator.shutdown().await.unwrap();

        let puts = engine.puts.lock().unwrap().clone();
        assert_eq!(puts, vec![item(0).key, item(1).key, item(2).key]);
        let workers = coordinator.workers();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].status, WorkerStatus::Stopped);
        assert_eq!(workers[0].items_written, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_first_error_cancels_everyone() {
        let engine = Arc::new(RecordingEngine {
            fail_on: Some(item(20).key),
            delay: Duration::from_millis(1),
            ..Default::default()
        });
        let mut coordinator =
            Coordinator::start(Arc::clone(&engine), 8, WriteOptions::default(), Progress::sink(0));

        let mut offered = 0;
        for i in 0..10_000 {
            if coordinator.submit(item(i)).await == Submit::Cancelled {
                break;
            }
            offered += 1;
        }
        assert!(offered < 10_000);
        assert!(coordinator.is_cancelled());

        let result = timeout(Duration::from_secs(5), coordinator.shutdown())
            .await
            .expect("shutdown must be bounded");
        assert!(matches!(result, Err(KvBenchError::EngineWrite(_))));

        // everything dequeued before the failing item is applied; after it,
        // each worker finishes at most its in-flight put and one more
        let puts = engine.puts.lock().unwrap().clone();
        assert!(puts.len() <= 20 + 2 * 8, "{} puts after cancellation", puts.len());
        assert!(puts.len() < offered);
        assert!((0..20).all(|i| puts.contains(&item(i).key)));
        assert!(!puts.contains(&item(20).key));
        let distinct: HashSet<_> = puts.iter().collect();
        assert_eq!(distinct.len(), puts.len());
        assert!(coordinator.workers().iter().all(|w| w.is_stopped()));

        // the error is surfaced once
        assert!(coordinator.shutdown().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_unblocks_producer() {
        let engine = Arc::new(RecordingEngine {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let mut coordinator =
            Coordinator::start(Arc::clone(&engine), 2, WriteOptions::default(), Progress::sink(0));

        let signal = coordinator.cancel_signal();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.cancel();
        });

        // two workers busy plus two queued: the fifth submit blocks until
        // the cancellation arrives
        let mut last = Submit::Queued;
        for i in 0..100 {
            last = coordinator.submit(item(i)).await;
            if last == Submit::Cancelled {
                break;
            }
        }
        assert_eq!(last, Submit::Cancelled);

        timeout(Duration::from_secs(5), coordinator.shutdown())
            .await
            .expect("shutdown must be bounded")
            .unwrap();
        assert!(coordinator.all_workers_stopped());
        // in-flight writes were allowed to finish
        assert!(engine.puts.lock().unwrap().len() <= 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_all_releases_blocked_producer() {
        let engine = Arc::new(RecordingEngine {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let mut coordinator =
            Coordinator::start(Arc::clone(&engine), 2, WriteOptions::default(), Progress::sink(0));

        let producer = async {
            for i in 0..100 {
                if coordinator.submit(item(i)).await == Submit::Cancelled {
                    return Some(i);
                }
            }
            None
        };
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator.cancel_all();
        };
        let (stopped_at, ()) = tokio::join!(producer, canceller);

        // two in flight and two queued before the producer blocked
        assert_eq!(stopped_at, Some(4));
        assert!(coordinator.is_cancelled());
        assert_eq!(coordinator.submit(item(99)).await, Submit::Cancelled);

        timeout(Duration::from_secs(5), coordinator.shutdown())
            .await
            .expect("shutdown must be bounded")
            .unwrap();
        assert!(coordinator.all_workers_stopped());
        assert!(coordinator.workers().iter().all(|w| w.status == WorkerStatus::Stopped));
        // queued items are abandoned
        assert_eq!(engine.puts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_cancel_signal_is_idempotent() {
        let signal = CancelSignal::new();
        let other = signal.clone();
        assert!(!other.is_cancelled());

        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(!other.cancel());
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_for_late_waiters() {
        let signal = CancelSignal::new();
        signal.cancel();
        timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("already-fired signal must resolve");
    }

    #[test]
    fn test_worker_slot_never_leaves_stopped() {
        let slot = WorkerSlot::new();
        assert_eq!(slot.status(), WorkerStatus::Idle);
        slot.set(WorkerStatus::Writing);
        assert!(slot.info(3).is_active());
        slot.set(WorkerStatus::Stopped);
        slot.set(WorkerStatus::Writing);
        assert_eq!(slot.status(), WorkerStatus::Stopped);
        assert_eq!(slot.info(3).id, 3);
    }
}
