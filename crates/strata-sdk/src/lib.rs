//! Strata SDK - Tiered Agent Memory
//!
//! This crate provides the memory subsystem of an agent runtime. All
//! functionality is accessible through this single crate, including:
//!
//! # Core Types (from strata-core)
//!
//! - **types** - Memory items, memory types and tiers, metadata values
//! - **db** - SQLite vector record storage
//!
//! # SDK Modules
//!
//! - **memory** - Tiered cache (short-term, episodic, semantic), vector store
//!   adapter and write queue, embedding memo, lazy queries
//! - **providers** - Completion/embedding capability traits, the priority
//!   fallback router and provider health tracking
//! - **context** - Caller-supplied deadlines and cancellation
//!
//! # Features
//!
//! - `http-providers` (default) - OpenAI-compatible HTTP provider via `reqwest`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_sdk::{Capability, HashEmbeddingProvider, MemoryType, NewMemory};
//! use strata_sdk::{ProviderConfig, ProviderHandle, RequestContext, Strata, StrataConfig};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = StrataConfig::new("strata.db")
//!         .with_provider(ProviderConfig::new("hash", 1, &[Capability::Embedding]));
//!     let providers = vec![
//!         ProviderHandle::new("hash").with_embedding(Arc::new(HashEmbeddingProvider::default())),
//!     ];
//!
//!     let mut strata = Strata::new(config, providers)?;
//!     strata.initialize().await?;
//!
//!     let ctx = RequestContext::background();
//!     strata
//!         .memory()
//!         .store(&ctx, NewMemory::new("User prefers tabs", MemoryType::WorkingMemory))
//!         .await?;
//!
//!     let hits = strata.memory().search(&ctx, "indentation", 5).await?;
//!     println!("{} similar items", hits.len());
//!
//!     strata.shutdown().await?;
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Re-export core modules from strata-core
// ─────────────────────────────────────────────────────────────────────────────

/// Vector record storage
pub use strata_core::db;

/// Core types (MemoryItem, MemoryType, MemoryTier, etc.)
pub use strata_core::types;

/// Error types from core
pub use strata_core::error as core_error;

pub use strata_core::{MemoryItem, MemoryTier, MemoryType, Metadata, MetadataValue};

// ─────────────────────────────────────────────────────────────────────────────
// SDK-specific modules
// ─────────────────────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod memory;
pub mod providers;
pub mod utils;

mod error;
mod sdk;

// Re-export main SDK types
pub use config::{
    ConfigValidationError, HealthConfig, MemoryConfig, ProviderConfig, RouterConfig, StrataConfig,
    TierCapacity, VectorStoreConfig,
};
pub use context::RequestContext;
pub use error::{CancelReason, ProviderAttempt, StrataError, StrataResult};
pub use sdk::Strata;

pub use memory::{
    EmbeddingGenerator, MemoryManager, MemoryStats, NewMemory, PersistenceFailure, QueryCursor,
    ScoredItem, SqliteVectorStore, TierStats, TieredCacheManager, VectorStoreAdapter,
};

pub use providers::{
    Capability, CompletionOptions, CompletionProvider, EchoCompletionProvider, EmbeddingProvider,
    HashEmbeddingProvider, HealthState, ProviderDescriptor, ProviderError, ProviderHandle,
    ProviderHealthTracker, ProviderRouter, RetryConfig,
};

#[cfg(feature = "http-providers")]
pub use providers::{OpenAiCompatibleProvider, OpenAiSettings};
