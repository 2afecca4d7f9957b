//! Durable storage for semantic-tier items.
//!
//! [`VectorStoreAdapter`] is the seam between the memory manager and the
//! storage engine. [`SqliteVectorStore`] implements it over the core
//! `Database`; every call runs on the blocking pool so a cancelled caller can
//! walk away from it.

use std::sync::Arc;

use async_trait::async_trait;
use strata_core::db::UpsertOutcome;
use strata_core::{Database, MemoryItem, MemoryType, VectorRecord};

use super::types::ScoredItem;
use crate::context::RequestContext;
use crate::error::{StrataError, StrataResult};
use crate::providers::cosine_similarity;
use crate::utils::now_millis;

/// Result of a persist call.
pub type PersistOutcome = UpsertOutcome;

/// Storage operations for persisted memory items.
#[async_trait]
pub trait VectorStoreAdapter: Send + Sync {
    /// Write `item` with `embedding` unless the stored version is the same
    /// or newer.
    async fn persist(&self, ctx: &RequestContext, item: &MemoryItem, embedding: Vec<f32>) -> StrataResult<PersistOutcome>;

    /// Read one item by id.
    async fn fetch(&self, ctx: &RequestContext, id: &str) -> StrataResult<Option<MemoryItem>>;

    /// Items ordered by id, starting after `after_id`.
    async fn page(
        &self,
        ctx: &RequestContext,
        after_id: Option<&str>,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> StrataResult<Vec<MemoryItem>>;

    /// Up to `top_k` items by descending cosine similarity; ties go to the
    /// higher version.
    async fn query(&self, ctx: &RequestContext, embedding: &[f32], top_k: usize) -> StrataResult<Vec<ScoredItem>>;

    /// Hard delete. Returns whether a record existed.
    async fn delete(&self, ctx: &RequestContext, id: &str) -> StrataResult<bool>;

    /// Number of stored items.
    async fn count(&self, ctx: &RequestContext) -> StrataResult<usize>;
}

/// SQLite-backed vector store.
#[derive(Clone)]
pub struct SqliteVectorStore {
    db: Arc<Database>,
}

impl SqliteVectorStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a database call on the blocking pool under the caller's context.
    async fn blocking<T, F>(&self, ctx: &RequestContext, operation: &'static str, id: Option<&str>, f: F) -> StrataResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> strata_core::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        let subject = id.unwrap_or("vector_records").to_string();
        ctx.run(operation, id, async move {
            tokio::task::spawn_blocking(move || f(&db))
                .await
                .map_err(|e| StrataError::persistence(subject.clone(), format!("{} task failed: {}", operation, e)))?
                .map_err(|e| StrataError::persistence(subject, e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl VectorStoreAdapter for SqliteVectorStore {
    async fn persist(&self, ctx: &RequestContext, item: &MemoryItem, embedding: Vec<f32>) -> StrataResult<PersistOutcome> {
        let mut record = VectorRecord::from_item(item, embedding);
        record.updated_at = now_millis();
        self.blocking(ctx, "persist", Some(&item.id), move |db| db.upsert_vector_record(&record))
            .await
    }

    async fn fetch(&self, ctx: &RequestContext, id: &str) -> StrataResult<Option<MemoryItem>> {
        let key = id.to_string();
        let record = self
            .blocking(ctx, "fetch", Some(id), move |db| db.get_vector_record(&key))
            .await?;
        Ok(record.map(VectorRecord::into_item))
    }

    async fn page(
        &self,
        ctx: &RequestContext,
        after_id: Option<&str>,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> StrataResult<Vec<MemoryItem>> {
        let after = after_id.map(String::from);
        let records = self
            .blocking(ctx, "page", None, move |db| {
                db.list_vector_records(after.as_deref(), limit, memory_type)
            })
            .await?;
        Ok(records.into_iter().map(VectorRecord::into_item).collect())
    }

    async fn query(&self, ctx: &RequestContext, embedding: &[f32], top_k: usize) -> StrataResult<Vec<ScoredItem>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let probe = embedding.to_vec();

        self.blocking(ctx, "query", None, move |db| {
            let mut scored: Vec<(f32, u64, String)> = db
                .scan_embeddings()?
                .into_iter()
                .filter(|row| row.embedding.len() == probe.len())
                .map(|row| (cosine_similarity(&probe, &row.embedding), row.version, row.id))
                .collect();

            scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
            scored.truncate(top_k);

            let mut hits = Vec::with_capacity(scored.len());
            for (score, _, id) in scored {
                // A concurrent delete may remove a row between scan and read
                if let Some(record) = db.get_vector_record(&id)? {
                    hits.push(ScoredItem {
                        item: record.into_item(),
                        score,
                    });
                }
            }
            Ok(hits)
        })
        .await
    }

    async fn delete(&self, ctx: &RequestContext, id: &str) -> StrataResult<bool> {
        let key = id.to_string();
        self.blocking(ctx, "delete", Some(id), move |db| db.delete_vector_record(&key))
            .await
    }

    async fn count(&self, ctx: &RequestContext) -> StrataResult<usize> {
        self.blocking(ctx, "count", None, |db| db.count_vector_records()).await
    }
}
