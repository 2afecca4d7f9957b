//! Tiered Agent Memory
//!
//! Three cache tiers sit in front of a durable vector store:
//! - Short-term: context and working memories (cache only)
//! - Episodic: episodic memories (cache only; evicted items are gone)
//! - Semantic: semantic memories, written through to the vector store
//!
//! # Architecture
//!
//! 1. `MemoryManager::store` routes an item to its type's tier
//! 2. Semantic writes are acknowledged once cached and queued; a background
//!    worker embeds and persists them
//! 3. `retrieve` reads the cache first and falls back to the vector store,
//!    caching the hit again
//!
//! Each tier is bounded and evicts its least recently used unpinned entry.

mod cache;
mod key_lock;
mod lru;
mod manager;
mod query;
mod types;
mod write_queue;

pub mod embeddings;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{PinId, TieredCacheManager};
pub use embeddings::EmbeddingGenerator;
pub use manager::MemoryManager;
pub use query::{Predicate, QueryCursor};
pub use types::{
    parse_memory_type, MemoryStats, NewMemory, PersistenceFailure, ScoredItem, TierStats,
};
pub use vector_store::{PersistOutcome, SqliteVectorStore, VectorStoreAdapter};
pub use write_queue::{ReleaseFn, WriteQueue};
