//! Memory manager: the public store/retrieve/query/delete facade.
//!
//! ```text
//! store ──▶ key lock ──▶ tier cache ──(semantic)──▶ write queue ──▶ vector store
//! retrieve ──▶ tier cache ──(miss)──▶ key lock ──▶ vector store ──▶ semantic cache
//! ```
//!
//! Writes to one id are serialized by a sharded key lock, so a caller always
//! reads back its own latest write. Ordering across ids is not guaranteed.

use std::sync::Arc;

use strata_core::{MemoryItem, MemoryTier, MemoryType};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::cache::{PinId, TieredCacheManager};
use super::embeddings::EmbeddingGenerator;
use super::key_lock::KeyLocks;
use super::query::QueryCursor;
use super::types::{MemoryStats, NewMemory, PersistenceFailure, ScoredItem};
use super::vector_store::VectorStoreAdapter;
use super::write_queue::{ReleaseFn, WriteQueue};
use crate::config::{MemoryConfig, VectorStoreConfig};
use crate::context::RequestContext;
use crate::error::{StrataError, StrataResult};
use crate::utils::{now_millis, validate_item_id};

const ENTITY: &str = "MemoryItem";

/// Tiered agent memory.
///
/// Context and working memories live in the short-term cache, episodic
/// memories in the episodic cache (cache-only, lost on eviction), and
/// semantic memories in the semantic cache backed by the vector store.
pub struct MemoryManager {
    cache: Arc<TieredCacheManager>,
    store: Arc<dyn VectorStoreAdapter>,
    embeddings: Arc<EmbeddingGenerator>,
    queue: WriteQueue,
    locks: KeyLocks,
    query_page_size: usize,
}

impl MemoryManager {
    pub fn new(
        memory: &MemoryConfig,
        vector_store: &VectorStoreConfig,
        store: Arc<dyn VectorStoreAdapter>,
        embeddings: Arc<EmbeddingGenerator>,
    ) -> Self {
        let cache = Arc::new(TieredCacheManager::new(memory));

        let pins = cache.clone();
        let release: ReleaseFn = Arc::new(move |id: &str, pin: PinId| {
            if !pins.unpin(id, pin) {
                debug!(id = %id, "settled write no longer cached");
            }
        });
        let queue = WriteQueue::new(vector_store.clone(), store.clone(), embeddings.clone(), release);

        Self {
            cache,
            store,
            embeddings,
            queue,
            locks: KeyLocks::new(memory.key_lock_shards),
            query_page_size: vector_store.query_page_size.max(1),
        }
    }

    /// Start the vector-store write worker.
    pub async fn start(&self) -> StrataResult<()> {
        self.queue.start().await?;
        info!("memory manager started");
        Ok(())
    }

    /// Stop accepting semantic writes and drain the queue.
    pub async fn shutdown(&self) -> StrataResult<()> {
        self.queue.shutdown().await?;
        info!(pending = self.queue.pending(), "memory manager stopped");
        Ok(())
    }

    /// Wait until every acknowledged semantic write has settled.
    pub async fn flush(&self, ctx: &RequestContext) -> StrataResult<()> {
        self.queue.flush(ctx).await
    }

    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }

    /// Store a memory item and return its id.
    ///
    /// Re-storing an existing id replaces its content and bumps its version.
    /// Semantic items are acknowledged once cached and queued; durability
    /// follows asynchronously (see [`Self::persistence_failures`]).
    pub async fn store(&self, ctx: &RequestContext, input: NewMemory) -> StrataResult<String> {
        input.validate()?;
        let generated = input.id.is_none();
        let id = input.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        ctx.check("store", Some(&id))?;

        let tier = input.memory_type.tier();
        if tier == MemoryTier::Semantic && !self.queue.is_running() {
            return Err(StrataError::invalid_operation(
                "semantic writes need a started memory manager",
            ));
        }

        let _guard = ctx
            .run("store", Some(&id), async { Ok(self.locks.lock(&id).await) })
            .await?;

        let cached = self.cache.peek_any(&id);
        let previous = match &cached {
            Some((_, item)) => Some(item.clone()),
            None if generated => None,
            None => self.store.fetch(ctx, &id).await?,
        };

        if let Some(previous) = &previous {
            if previous.memory_type != input.memory_type {
                return Err(StrataError::validation(format!(
                    "item {} is stored as {}, cannot re-store it as {}",
                    id, previous.memory_type, input.memory_type
                )));
            }
        }

        let item = MemoryItem {
            id: id.clone(),
            content: input.content,
            memory_type: input.memory_type,
            metadata: input.metadata,
            created_at: previous.as_ref().map(|p| p.created_at).unwrap_or_else(now_millis),
            embedding: input.embedding,
            version: previous.as_ref().map(|p| p.version + 1).unwrap_or(1),
        };
        let version = item.version;

        self.cache.remove_elsewhere(&id, tier);
        match tier {
            MemoryTier::ShortTerm | MemoryTier::Episodic => {
                for evicted in self.cache.put(tier, item) {
                    debug!(id = %evicted, tier = %tier, "evicted to make room");
                }
            }
            MemoryTier::Semantic => {
                let pin = self.cache.put_pinned(tier, item.clone());
                if let Err(e) = self.queue.enqueue(ctx, item, Some(pin)).await {
                    self.roll_back(&id, tier, pin, cached);
                    return Err(e);
                }
            }
        }

        debug!(id = %id, tier = %tier, version, "stored memory item");
        Ok(id)
    }

    /// Undo the cache side of a semantic write that never reached the queue.
    fn roll_back(&self, id: &str, tier: MemoryTier, pin: PinId, cached: Option<(MemoryTier, MemoryItem)>) {
        match cached {
            // Replacing in place keeps the pins of older queued writes
            Some((previous_tier, previous)) if previous_tier == tier => {
                self.cache.put(tier, previous);
                self.cache.unpin(id, pin);
            }
            Some((previous_tier, previous)) => {
                self.cache.remove_from(tier, id);
                self.cache.put(previous_tier, previous);
            }
            None => {
                self.cache.remove_from(tier, id);
            }
        }
    }

    /// Fetch an item by id: cache first, then the vector store.
    ///
    /// A vector-store hit is cached again in its tier.
    pub async fn retrieve(&self, ctx: &RequestContext, id: &str) -> StrataResult<MemoryItem> {
        validate_item_id(id)?;
        ctx.check("retrieve", Some(id))?;

        if let Some((_, item)) = self.cache.lookup(id) {
            return Ok(item);
        }

        let _guard = ctx
            .run("retrieve", Some(id), async { Ok(self.locks.lock(id).await) })
            .await?;

        // A concurrent store may have landed while we waited
        if let Some((_, item)) = self.cache.peek_any(id) {
            return Ok(item);
        }

        // A delete is still undoing an in-flight write; the row may be back
        // for a moment but must not be cached again
        if self.queue.is_deleted(id) {
            debug!(id = %id, "skipping read-through of deleted item");
            return Err(StrataError::not_found(ENTITY, id));
        }

        match self.store.fetch(ctx, id).await? {
            Some(item) => {
                let tier = item.tier();
                if self.cache.put_if_newer(tier, item.clone()) {
                    debug!(id = %id, tier = %tier, version = item.version, "read through from vector store");
                }
                Ok(item)
            }
            None => Err(StrataError::not_found(ENTITY, id)),
        }
    }

    /// Lazily scan items of one type, cache tiers first.
    pub fn query<P>(&self, ctx: &RequestContext, memory_type: MemoryType, predicate: P) -> QueryCursor
    where
        P: Fn(&MemoryItem) -> bool + Send + Sync + 'static,
    {
        self.cursor(ctx, Some(memory_type), Box::new(predicate))
    }

    /// Lazily scan items of every type.
    pub fn query_all<P>(&self, ctx: &RequestContext, predicate: P) -> QueryCursor
    where
        P: Fn(&MemoryItem) -> bool + Send + Sync + 'static,
    {
        self.cursor(ctx, None, Box::new(predicate))
    }

    fn cursor(&self, ctx: &RequestContext, memory_type: Option<MemoryType>, predicate: super::query::Predicate) -> QueryCursor {
        QueryCursor::new(
            ctx.clone(),
            self.cache.clone(),
            self.store.clone(),
            memory_type,
            predicate,
            self.query_page_size,
        )
    }

    /// Remove an item everywhere. Queued writes of the id are dropped.
    ///
    /// Returns whether anything was removed; deleting twice is not an error.
    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> StrataResult<bool> {
        validate_item_id(id)?;
        ctx.check("delete", Some(id))?;

        let _guard = ctx
            .run("delete", Some(id), async { Ok(self.locks.lock(id).await) })
            .await?;

        let queued = self.queue.mark_deleted(id);
        let cached = self.cache.remove(id).is_some();
        let stored = self.store.delete(ctx, id).await?;

        debug!(id = %id, cached, stored, queued, "deleted memory item");
        Ok(cached || stored || queued)
    }

    /// Persisted items most similar to `text`.
    ///
    /// Semantic writes still in the queue are not visible here yet.
    pub async fn search(&self, ctx: &RequestContext, text: &str, top_k: usize) -> StrataResult<Vec<ScoredItem>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embeddings.embed(ctx, text).await?;
        self.store.query(ctx, &embedding, top_k).await
    }

    /// Items currently cached in a tier, least recently used first.
    pub fn items_in_tier(&self, tier: MemoryTier) -> Vec<MemoryItem> {
        self.cache.items(tier)
    }

    /// Move a cached item to a higher tier.
    pub fn promote(&self, id: &str, to: MemoryTier) -> StrataResult<()> {
        let from = self.cache.locate(id).ok_or_else(|| StrataError::not_found(ENTITY, id))?;
        if to.rank() <= from.rank() {
            return Err(StrataError::validation(format!(
                "cannot promote {} from {} to {}",
                id, from, to
            )));
        }
        if !self.cache.promote(id, from, to) {
            return Err(StrataError::not_found(ENTITY, id));
        }
        Ok(())
    }

    /// Move a cached item to a lower tier.
    pub fn demote(&self, id: &str, to: MemoryTier) -> StrataResult<()> {
        let from = self.cache.locate(id).ok_or_else(|| StrataError::not_found(ENTITY, id))?;
        if to.rank() >= from.rank() {
            return Err(StrataError::validation(format!(
                "cannot demote {} from {} to {}",
                id, from, to
            )));
        }
        if !self.cache.demote(id, from, to) {
            return Err(StrataError::not_found(ENTITY, id));
        }
        Ok(())
    }

    /// Drop unpinned cached entries of a tier. Persisted items stay
    /// retrievable.
    pub fn clear_tier(&self, tier: MemoryTier) -> usize {
        let dropped = self.cache.clear(tier);
        info!(tier = %tier, dropped, "cleared cache tier");
        dropped
    }

    /// Subscribe to semantic writes that failed for good.
    pub fn persistence_failures(&self) -> broadcast::Receiver<PersistenceFailure> {
        self.queue.subscribe_failures()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            tiers: self.cache.stats(),
            cache_misses: self.cache.misses(),
            embedding_cache_hits: self.embeddings.hits(),
            embedding_cache_misses: self.embeddings.misses(),
            embedding_cache_size: self.embeddings.len(),
            pending_writes: self.queue.pending(),
            persisted_writes: self.queue.persisted(),
            persistence_failures: self.queue.failed(),
        }
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingGenerator> {
        &self.embeddings
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStoreAdapter> {
        &self.store
    }

    pub(crate) fn cache(&self) -> &TieredCacheManager {
        &self.cache
    }
}
