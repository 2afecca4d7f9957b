//! Test doubles for the memory layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use strata_core::{Database, MemoryItem, MemoryType};

use super::embeddings::EmbeddingGenerator;
use super::types::ScoredItem;
use super::vector_store::{PersistOutcome, SqliteVectorStore, VectorStoreAdapter};
use crate::config::{ProviderConfig, RouterConfig};
use crate::context::RequestContext;
use crate::error::{StrataError, StrataResult};
use crate::providers::{Capability, HashEmbeddingProvider, ProviderHandle, ProviderRouter};

/// In-memory SQLite store whose first `failures` persists fail.
///
/// Persists can also be slowed down on both sides of the commit to widen
/// the window between a row landing and the caller hearing about it.
pub(crate) struct FlakyStore {
    inner: SqliteVectorStore,
    failures: AtomicU32,
    persist_calls: AtomicU32,
    commit_delay: Duration,
    ack_delay: Duration,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        Self {
            inner: SqliteVectorStore::new(Arc::new(db)),
            failures: AtomicU32::new(failures),
            persist_calls: AtomicU32::new(0),
            commit_delay: Duration::ZERO,
            ack_delay: Duration::ZERO,
        }
    }

    /// Sleep `commit` before writing the row and `ack` after it.
    pub fn with_delays(mut self, commit: Duration, ack: Duration) -> Self {
        self.commit_delay = commit;
        self.ack_delay = ack;
        self
    }

    pub fn reliable() -> Self {
        Self::new(0)
    }

    pub fn broken() -> Self {
        Self::new(u32::MAX)
    }

    pub fn persist_calls(&self) -> u32 {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStoreAdapter for FlakyStore {
    async fn persist(&self, ctx: &RequestContext, item: &MemoryItem, embedding: Vec<f32>) -> StrataResult<PersistOutcome> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StrataError::persistence(&item.id, "disk I/O error"));
        }
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        let outcome = self.inner.persist(ctx, item, embedding).await?;
        if !self.ack_delay.is_zero() {
            tokio::time::sleep(self.ack_delay).await;
        }
        Ok(outcome)
    }

    async fn fetch(&self, ctx: &RequestContext, id: &str) -> StrataResult<Option<MemoryItem>> {
        self.inner.fetch(ctx, id).await
    }

    async fn page(
        &self,
        ctx: &RequestContext,
        after_id: Option<&str>,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> StrataResult<Vec<MemoryItem>> {
        self.inner.page(ctx, after_id, limit, memory_type).await
    }

    async fn query(&self, ctx: &RequestContext, embedding: &[f32], top_k: usize) -> StrataResult<Vec<ScoredItem>> {
        self.inner.query(ctx, embedding, top_k).await
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> StrataResult<bool> {
        self.inner.delete(ctx, id).await
    }

    async fn count(&self, ctx: &RequestContext) -> StrataResult<usize> {
        self.inner.count(ctx).await
    }
}

/// Embedding generator backed by the offline hash provider.
pub(crate) fn hash_embeddings(dimensions: usize) -> Arc<EmbeddingGenerator> {
    let mut router = ProviderRouter::new(&RouterConfig::default());
    router
        .register(
            ProviderConfig::new("hash", 1, &[Capability::Embedding]),
            ProviderHandle::new("hash").with_embedding(Arc::new(HashEmbeddingProvider::new(dimensions))),
        )
        .unwrap();
    Arc::new(EmbeddingGenerator::new(Arc::new(router), 16))
}
