//! Lazy scans over every tier.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use strata_core::{MemoryItem, MemoryTier, MemoryType};

use super::cache::TieredCacheManager;
use super::vector_store::VectorStoreAdapter;
use crate::context::RequestContext;
use crate::error::StrataResult;

/// Filter applied to each scanned item.
pub type Predicate = Box<dyn Fn(&MemoryItem) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Cache,
    Store,
    Done,
}

/// A finite, non-restartable scan.
///
/// Cache tiers are walked first, in rank order, from a snapshot of ids taken
/// when the cursor was created. Items evicted or deleted since then are
/// skipped. The vector store is paged afterwards for semantic items, skipping
/// ids the cache already produced.
pub struct QueryCursor {
    ctx: RequestContext,
    cache: Arc<TieredCacheManager>,
    store: Arc<dyn VectorStoreAdapter>,
    memory_type: Option<MemoryType>,
    predicate: Predicate,
    snapshot: VecDeque<String>,
    seen: HashSet<String>,
    page: VecDeque<MemoryItem>,
    after: Option<String>,
    page_size: usize,
    last_page: bool,
    stage: Stage,
}

impl QueryCursor {
    pub(crate) fn new(
        ctx: RequestContext,
        cache: Arc<TieredCacheManager>,
        store: Arc<dyn VectorStoreAdapter>,
        memory_type: Option<MemoryType>,
        predicate: Predicate,
        page_size: usize,
    ) -> Self {
        let snapshot = MemoryTier::ALL
            .into_iter()
            .flat_map(|tier| cache.ids(tier))
            .collect();

        Self {
            ctx,
            cache,
            store,
            memory_type,
            predicate,
            snapshot,
            seen: HashSet::new(),
            page: VecDeque::new(),
            after: None,
            page_size: page_size.max(1),
            last_page: false,
            stage: Stage::Cache,
        }
    }

    fn wanted(&self, item: &MemoryItem) -> bool {
        self.memory_type.is_none_or(|t| t == item.memory_type)
    }

    /// Whether the vector store can hold items this cursor wants.
    fn scans_store(&self) -> bool {
        match self.memory_type {
            None => true,
            Some(t) => t.tier().is_durable(),
        }
    }

    /// Next matching item, or `None` once the scan is exhausted.
    pub async fn next(&mut self) -> StrataResult<Option<MemoryItem>> {
        if let Err(e) = self.ctx.check("query", None) {
            self.stage = Stage::Done;
            return Err(e);
        }

        loop {
            match self.stage {
                Stage::Cache => {
                    let Some(id) = self.snapshot.pop_front() else {
                        self.stage = if self.scans_store() { Stage::Store } else { Stage::Done };
                        continue;
                    };
                    if self.seen.contains(&id) {
                        continue;
                    }
                    // The entry may have moved tiers since the snapshot
                    let Some((_, item)) = self.cache.peek_any(&id) else {
                        continue;
                    };
                    if !self.wanted(&item) {
                        continue;
                    }
                    self.seen.insert(id);
                    if (self.predicate)(&item) {
                        return Ok(Some(item));
                    }
                }
                Stage::Store => {
                    if let Some(item) = self.page.pop_front() {
                        if self.seen.insert(item.id.clone()) && (self.predicate)(&item) {
                            return Ok(Some(item));
                        }
                        continue;
                    }
                    if self.last_page {
                        self.stage = Stage::Done;
                        continue;
                    }
                    if let Err(e) = self.fill_page().await {
                        self.stage = Stage::Done;
                        return Err(e);
                    }
                }
                Stage::Done => return Ok(None),
            }
        }
    }

    async fn fill_page(&mut self) -> StrataResult<()> {
        let page = self
            .store
            .page(&self.ctx, self.after.as_deref(), self.page_size, self.memory_type)
            .await?;

        self.last_page = page.len() < self.page_size;
        if let Some(last) = page.last() {
            self.after = Some(last.id.clone());
        }
        self.page.extend(page);
        Ok(())
    }

    /// Drain up to `limit` matching items.
    pub async fn collect(mut self, limit: usize) -> StrataResult<Vec<MemoryItem>> {
        let mut items = Vec::new();
        while items.len() < limit {
            match self.next().await? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }
}
