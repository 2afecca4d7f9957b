//! Bounded asynchronous write queue for the vector store.
//!
//! `store` acknowledges a semantic write once it is cached and queued; the
//! worker makes it durable later.
//!
//! ```text
//!  enqueue ──▶ [ bounded mpsc ] ──▶ worker: drain ≤ batch_size
//!   (waits when full)                  │ drop jobs older than a delete
//!                                      │ coalesce per id (latest wins)
//!                                      │ embed if needed, persist, retry
//!                                      ▼
//!                         release cache pin / report failure
//! ```
//!
//! A write that still fails after the configured attempts is logged and
//! published on the failure channel; the caller's `store` already returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use strata_core::MemoryItem;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::cache::PinId;
use super::embeddings::EmbeddingGenerator;
use super::types::PersistenceFailure;
use super::vector_store::VectorStoreAdapter;
use crate::config::VectorStoreConfig;
use crate::context::RequestContext;
use crate::error::{StrataError, StrataResult};
use crate::providers::RetryStrategy;

/// Called when a queued write settles, to release the cache pin it held.
pub type ReleaseFn = Arc<dyn Fn(&str, PinId) + Send + Sync>;

struct WriteJob {
    item: MemoryItem,
    pin: Option<PinId>,
    seq: u64,
}

struct Shared {
    store: Arc<dyn VectorStoreAdapter>,
    embeddings: Arc<EmbeddingGenerator>,
    release: ReleaseFn,
    retry: RetryStrategy,
    failures: broadcast::Sender<PersistenceFailure>,
    /// Queued-but-unsettled jobs per id
    pending: DashMap<String, usize>,
    pending_total: AtomicUsize,
    /// Sequence number of the latest delete per id
    tombstones: DashMap<String, u64>,
    seq: AtomicU64,
    settled: Notify,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Bounded queue plus the worker that drains it.
pub struct WriteQueue {
    config: VectorStoreConfig,
    shared: Arc<Shared>,
    sender: parking_lot::Mutex<Option<mpsc::Sender<WriteJob>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl WriteQueue {
    pub fn new(
        config: VectorStoreConfig,
        store: Arc<dyn VectorStoreAdapter>,
        embeddings: Arc<EmbeddingGenerator>,
        release: ReleaseFn,
    ) -> Self {
        let (failures, _) = broadcast::channel(config.failure_channel_capacity.max(1));
        let shared = Arc::new(Shared {
            store,
            embeddings,
            release,
            retry: RetryStrategy::new(config.retry()),
            failures,
            pending: DashMap::new(),
            pending_total: AtomicUsize::new(0),
            tombstones: DashMap::new(),
            seq: AtomicU64::new(1),
            settled: Notify::new(),
            persisted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        Self {
            config,
            shared,
            sender: parking_lot::Mutex::new(None),
            worker: tokio::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the worker. Must run inside a Tokio runtime.
    pub async fn start(&self) -> StrataResult<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(StrataError::invalid_operation("write queue already started"));
        }
        if self.shutdown.is_cancelled() {
            return Err(StrataError::invalid_operation("write queue was shut down"));
        }

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        *self.sender.lock() = Some(tx);

        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();
        let batch_size = self.config.batch_size.max(1);
        *worker = Some(tokio::spawn(run_worker(shared, rx, shutdown, batch_size)));

        info!(
            queue_capacity = self.config.queue_capacity,
            batch_size, "vector store write queue started"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Queue a write, waiting for room when the queue is full.
    ///
    /// On error nothing was queued and the pin (if any) is still held by the
    /// caller.
    pub async fn enqueue(&self, ctx: &RequestContext, item: MemoryItem, pin: Option<PinId>) -> StrataResult<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| StrataError::invalid_operation("write queue is not running"))?;

        let id = item.id.clone();
        let permit = ctx
            .run("store", Some(&id), async {
                sender
                    .reserve()
                    .await
                    .map_err(|_| StrataError::invalid_operation("write queue is closed"))
            })
            .await?;

        // Count before the job becomes visible to the worker
        self.shared.add_pending(&id);
        let seq = self.shared.seq.fetch_add(1, Ordering::SeqCst);
        debug!(id = %id, version = item.version, seq, "queued vector store write");
        permit.send(WriteJob { item, pin, seq });
        Ok(())
    }

    /// Make queued writes of `id` obsolete. Jobs queued before this call are
    /// dropped by the worker; a write already in flight is undone.
    ///
    /// Callers hold the id's key lock, so no enqueue of `id` races this.
    /// Ids with nothing queued leave no tombstone behind.
    pub fn mark_deleted(&self, id: &str) -> bool {
        if self.pending_for(id) == 0 {
            return false;
        }
        let seq = self.shared.seq.fetch_add(1, Ordering::SeqCst);
        self.shared.tombstones.insert(id.to_string(), seq);
        true
    }

    /// Whether a delete of `id` is waiting on writes that may still land.
    ///
    /// Until they settle, the vector store can briefly hold a row for `id`
    /// that is about to be removed again.
    pub fn is_deleted(&self, id: &str) -> bool {
        self.shared.tombstones.contains_key(id)
    }

    #[cfg(test)]
    pub(crate) fn tombstone_count(&self) -> usize {
        self.shared.tombstones.len()
    }

    /// Unsettled jobs for one id.
    pub fn pending_for(&self, id: &str) -> usize {
        self.shared.pending.get(id).map(|n| *n).unwrap_or(0)
    }

    /// Unsettled jobs overall.
    pub fn pending(&self) -> usize {
        self.shared.pending_total.load(Ordering::SeqCst)
    }

    pub fn persisted(&self) -> u64 {
        self.shared.persisted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Subscribe to final persistence failures.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<PersistenceFailure> {
        self.shared.failures.subscribe()
    }

    /// Wait until every queued write has settled.
    pub async fn flush(&self, ctx: &RequestContext) -> StrataResult<()> {
        ctx.run("flush", None, async {
            loop {
                let settled = self.shared.settled.notified();
                if self.pending() == 0 {
                    return Ok(());
                }
                settled.await;
            }
        })
        .await
    }

    /// Stop accepting writes, drain the queue and wait for the worker.
    pub async fn shutdown(&self) -> StrataResult<()> {
        self.sender.lock().take();
        self.shutdown.cancel();

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| StrataError::invalid_operation(format!("write queue worker failed: {}", e)))?;
            info!(
                persisted = self.persisted(),
                failed = self.failed(),
                "vector store write queue stopped"
            );
        }
        Ok(())
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<WriteJob>,
    shutdown: CancellationToken,
    batch_size: usize,
) {
    let mut batch = Vec::with_capacity(batch_size);

    loop {
        tokio::select! {
            received = rx.recv_many(&mut batch, batch_size) => {
                if received == 0 {
                    break;
                }
                shared.process(std::mem::take(&mut batch)).await;
            }
            _ = shutdown.cancelled() => break,
        }
    }

    // Refuse new jobs but drain whatever made it in
    rx.close();
    while rx.recv_many(&mut batch, batch_size).await > 0 {
        shared.process(std::mem::take(&mut batch)).await;
    }
    debug!("vector store write queue drained");
}

impl Shared {
    fn add_pending(&self, id: &str) {
        *self.pending.entry(id.to_string()).or_insert(0) += 1;
        self.pending_total.fetch_add(1, Ordering::SeqCst);
    }

    /// Settle one job: release its pin and drop its pending count.
    fn settle(&self, job: &WriteJob) {
        if let Some(pin) = job.pin {
            (self.release)(&job.item.id, pin);
        }

        let id = job.item.id.as_str();
        let drained = match self.pending.get_mut(id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if drained {
            self.pending.remove_if(id, |_, count| *count == 0);
            // No older job can still reference the tombstone
            self.tombstones.remove(id);
        }

        self.pending_total.fetch_sub(1, Ordering::SeqCst);
        self.settled.notify_waiters();
    }

    fn is_obsolete(&self, job: &WriteJob) -> bool {
        self.tombstones.get(&job.item.id).is_some_and(|t| *t > job.seq)
    }

    async fn process(&self, jobs: Vec<WriteJob>) {
        // Latest job per id, in first-seen order
        let mut order = Vec::new();
        let mut latest: HashMap<String, WriteJob> = HashMap::new();
        let mut superseded = Vec::new();

        for job in jobs {
            if self.is_obsolete(&job) {
                debug!(id = %job.item.id, seq = job.seq, "skipping write of deleted item");
                self.settle(&job);
                continue;
            }
            match latest.remove(&job.item.id) {
                Some(previous) if previous.seq > job.seq => {
                    superseded.push(job);
                    latest.insert(previous.item.id.clone(), previous);
                }
                Some(previous) => {
                    superseded.push(previous);
                    latest.insert(job.item.id.clone(), job);
                }
                None => {
                    order.push(job.item.id.clone());
                    latest.insert(job.item.id.clone(), job);
                }
            }
        }

        if !superseded.is_empty() {
            debug!(coalesced = superseded.len(), "coalesced queued writes");
        }

        for id in order {
            if let Some(job) = latest.remove(&id) {
                self.persist(&job).await;
                self.settle(&job);
            }
        }
        for job in &superseded {
            self.settle(job);
        }
    }

    async fn persist(&self, job: &WriteJob) {
        let ctx = RequestContext::background();
        let item = &job.item;

        let outcome = self
            .retry
            .execute(&ctx, "persist", |e: &StrataError| !e.is_validation(), |_| async {
                let embedding = match &item.embedding {
                    Some(embedding) => embedding.clone(),
                    None => self.embeddings.embed(&ctx, &item.content).await?,
                };
                self.store.persist(&ctx, item, embedding).await
            })
            .await;

        match outcome {
            Ok(Ok(result)) => {
                self.persisted.fetch_add(1, Ordering::Relaxed);
                if !result.is_written() {
                    debug!(id = %item.id, version = item.version, ?result, "stored version is newer; write skipped");
                }
                // A delete that raced this write wins
                if self.is_obsolete(job) {
                    if let Err(e) = self.store.delete(&ctx, &item.id).await {
                        error!(id = %item.id, error = %e, "failed to undo write of deleted item");
                    }
                }
            }
            Ok(Err(failure)) => self.report_failure(item, failure.attempts, failure.error.to_string()),
            Err(e) => self.report_failure(item, 0, e.to_string()),
        }
    }

    fn report_failure(&self, item: &MemoryItem, attempts: u32, message: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        error!(
            id = %item.id,
            version = item.version,
            attempts,
            error = %message,
            "vector store write failed; giving up"
        );
        // No subscribers is fine; the log line above is the record
        let _ = self.failures.send(PersistenceFailure {
            id: item.id.clone(),
            version: item.version,
            attempts,
            error: message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use strata_core::MemoryType;

    use crate::memory::testing::{hash_embeddings, FlakyStore};
    use crate::utils::now_millis;

    fn config() -> VectorStoreConfig {
        VectorStoreConfig {
            queue_capacity: 4,
            batch_size: 8,
            max_write_attempts: 3,
            retry_initial_delay_ms: 10,
            retry_max_delay_ms: 40,
            ..Default::default()
        }
    }

    fn item(id: &str, version: u64) -> MemoryItem {
        MemoryItem {
            id: id.to_string(),
            content: format!("{id} version {version}"),
            memory_type: MemoryType::SemanticMemory,
            metadata: Default::default(),
            created_at: now_millis(),
            embedding: None,
            version,
        }
    }

    fn queue(store: Arc<dyn VectorStoreAdapter>) -> (WriteQueue, Arc<parking_lot::Mutex<Vec<String>>>) {
        let released = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = released.clone();
        let release: ReleaseFn = Arc::new(move |id: &str, _pin: PinId| sink.lock().push(id.to_string()));
        (WriteQueue::new(config(), store, hash_embeddings(4), release), released)
    }

    #[tokio::test]
    async fn test_enqueue_requires_start() {
        let (queue, _) = queue(Arc::new(FlakyStore::reliable()));
        let err = queue
            .enqueue(&RequestContext::background(), item("a", 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn test_persists_and_embeds_missing_vectors() {
        let store = Arc::new(FlakyStore::reliable());
        let (queue, _) = queue(store.clone());
        let ctx = RequestContext::background();
        queue.start().await.unwrap();

        queue.enqueue(&ctx, item("a", 1), None).await.unwrap();
        queue.flush(&ctx).await.unwrap();

        let stored = store.fetch(&ctx, "a").await.unwrap().unwrap();
        assert_eq!(stored.embedding.map(|e| e.len()), Some(4));
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.persisted(), 1);
        queue.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let store = Arc::new(FlakyStore::new(2));
        let (queue, released) = queue(store.clone());
        let ctx = RequestContext::background();
        queue.start().await.unwrap();

        queue.enqueue(&ctx, item("a", 1), Some(PinId(7))).await.unwrap();
        queue.flush(&ctx).await.unwrap();

        assert_eq!(store.persist_calls(), 3);
        assert!(store.fetch(&ctx, "a").await.unwrap().is_some());
        assert_eq!(*released.lock(), vec!["a".to_string()]);
        assert_eq!(queue.failed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_failure_is_reported_on_side_channel() {
        let store = Arc::new(FlakyStore::broken());
        let (queue, released) = queue(store.clone());
        let ctx = RequestContext::background();
        let mut failures = queue.subscribe_failures();
        queue.start().await.unwrap();

        queue.enqueue(&ctx, item("a", 2), Some(PinId(1))).await.unwrap();

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.id, "a");
        assert_eq!(failure.version, 2);
        assert_eq!(failure.attempts, 3);
        assert!(failure.error.contains("disk I/O error"));

        queue.flush(&ctx).await.unwrap();
        // The pin is released even though the write failed
        assert_eq!(released.lock().len(), 1);
        assert_eq!(queue.failed(), 1);
    }

    #[tokio::test]
    async fn test_coalesces_to_latest_version() {
        let store = Arc::new(FlakyStore::reliable());
        let (queue, released) = queue(store.clone());
        let ctx = RequestContext::background();

        // Queue before starting the worker so all three land in one batch
        let (tx, rx) = mpsc::channel(8);
        for (seq, version) in [(1, 1), (2, 2), (3, 3)] {
            queue.shared.add_pending("a");
            tx.send(WriteJob {
                item: item("a", version),
                pin: Some(PinId(seq)),
                seq,
            })
            .await
            .unwrap();
        }
        drop(tx);
        run_worker(queue.shared.clone(), rx, CancellationToken::new(), 8).await;

        assert_eq!(store.persist_calls(), 1);
        assert_eq!(store.fetch(&ctx, "a").await.unwrap().unwrap().version, 3);
        assert_eq!(released.lock().len(), 3);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_delete_drops_older_queued_writes() {
        let store = Arc::new(FlakyStore::reliable());
        let (queue, released) = queue(store.clone());
        let ctx = RequestContext::background();

        let (tx, rx) = mpsc::channel(8);
        queue.shared.add_pending("a");
        let seq = queue.shared.seq.fetch_add(1, Ordering::SeqCst);
        tx.send(WriteJob { item: item("a", 1), pin: Some(PinId(1)), seq }).await.unwrap();
        assert!(queue.mark_deleted("a"));
        drop(tx);
        run_worker(queue.shared.clone(), rx, CancellationToken::new(), 8).await;

        assert_eq!(store.persist_calls(), 0);
        assert!(store.fetch(&ctx, "a").await.unwrap().is_none());
        assert_eq!(released.lock().len(), 1);
        // Tombstone is gone once nothing older is queued
        assert!(queue.shared.tombstones.is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_queued_writes_leaves_no_tombstone() {
        let (queue, _) = queue(Arc::new(FlakyStore::reliable()));
        for _ in 0..100 {
            assert!(!queue.mark_deleted("never-queued"));
        }
        assert!(!queue.is_deleted("never-queued"));
        assert_eq!(queue.tombstone_count(), 0);
    }

    #[tokio::test]
    async fn test_backpressure_blocks_until_cancelled() {
        let (queue, _) = queue(Arc::new(FlakyStore::reliable()));
        // Fill the channel without a worker draining it
        let (tx, _rx) = mpsc::channel(1);
        *queue.sender.lock() = Some(tx);

        let ctx = RequestContext::background();
        queue.enqueue(&ctx, item("a", 1), None).await.unwrap();

        let short = RequestContext::with_timeout(Duration::from_millis(20));
        let err = queue.enqueue(&short, item("b", 1), None).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(queue.pending_for("b"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let store = Arc::new(FlakyStore::reliable());
        let (queue, _) = queue(store.clone());
        let ctx = RequestContext::background();
        queue.start().await.unwrap();

        for i in 0..4 {
            queue.enqueue(&ctx, item(&format!("item-{i}"), 1), None).await.unwrap();
        }
        queue.shutdown().await.unwrap();

        assert_eq!(store.count(&ctx).await.unwrap(), 4);
        assert!(!queue.is_running());
        assert!(queue.enqueue(&ctx, item("late", 1), None).await.is_err());
        assert!(queue.start().await.is_err());
    }
}
