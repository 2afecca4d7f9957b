//! Main SDK Entry Point
//!
//! Provides the `Strata` struct that wires the components together.

use std::sync::Arc;

use strata_core::Database;
use tracing::info;

use crate::memory::{EmbeddingGenerator, MemoryManager, SqliteVectorStore};
use crate::providers::{ProviderHandle, ProviderRouter};
use crate::{StrataConfig, StrataResult};

/// Strata SDK - Main entry point
///
/// Owns the provider router, the embedding generator, the vector store and
/// the memory manager. Nothing here is global: build one per application and
/// pass it around.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use strata_sdk::{HashEmbeddingProvider, MemoryType, NewMemory, ProviderConfig, ProviderHandle};
/// use strata_sdk::{Capability, RequestContext, Strata, StrataConfig};
///
/// async fn example() -> anyhow::Result<()> {
///     let config = StrataConfig::in_memory()
///         .with_provider(ProviderConfig::new("hash", 1, &[Capability::Embedding]));
///     let hash = ProviderHandle::new("hash").with_embedding(Arc::new(HashEmbeddingProvider::default()));
///
///     let mut strata = Strata::new(config, vec![hash])?;
///     strata.initialize().await?;
///
///     let ctx = RequestContext::background();
///     let id = strata
///         .memory()
///         .store(&ctx, NewMemory::new("Rust has no GC", MemoryType::SemanticMemory))
///         .await?;
///     let item = strata.memory().retrieve(&ctx, &id).await?;
///     assert_eq!(item.version, 1);
///
///     strata.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Strata {
    /// SDK configuration
    config: StrataConfig,

    /// Vector store database
    db: Arc<Database>,

    /// Provider fallback chain
    router: Arc<ProviderRouter>,

    /// Memoizing embedding front-end
    embeddings: Arc<EmbeddingGenerator>,

    /// Tiered memory
    memory: Arc<MemoryManager>,

    /// Whether the SDK has been initialized
    initialized: bool,
}

impl Strata {
    /// Create a new SDK instance
    ///
    /// # Arguments
    ///
    /// * `config` - SDK configuration
    /// * `providers` - Provider implementations, matched to the configured
    ///   descriptors by name
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - A configured provider has no implementation
    /// - Database connection fails
    pub fn new(config: StrataConfig, providers: Vec<ProviderHandle>) -> StrataResult<Self> {
        config.validate()?;

        let router = Arc::new(ProviderRouter::from_config(&config.router, &config.providers, providers)?);

        let db = if config.is_in_memory() {
            Database::open_in_memory()?
        } else {
            Database::open_path(&config.database_path)?
        };
        let db = Arc::new(db);

        let embeddings = Arc::new(EmbeddingGenerator::new(
            router.clone(),
            config.memory.embedding_cache_capacity,
        ));
        let store = Arc::new(SqliteVectorStore::new(db.clone()));
        let memory = Arc::new(MemoryManager::new(
            &config.memory,
            &config.vector_store,
            store,
            embeddings.clone(),
        ));

        Ok(Self {
            config,
            db,
            router,
            embeddings,
            memory,
            initialized: false,
        })
    }

    /// Initialize the SDK
    ///
    /// This runs database migrations and starts the write-queue worker.
    pub async fn initialize(&mut self) -> StrataResult<()> {
        if self.initialized {
            return Ok(());
        }

        self.run_migrations()?;
        self.memory.start().await?;

        info!(
            database = %self.config.database_path.display(),
            providers = self.router.descriptors().len(),
            "strata initialized"
        );
        self.initialized = true;
        Ok(())
    }

    /// Shutdown the SDK
    ///
    /// Drains queued semantic writes and stops the worker. The instance
    /// cannot be initialized again afterwards.
    pub async fn shutdown(&mut self) -> StrataResult<()> {
        if !self.initialized {
            return Ok(());
        }
        self.memory.shutdown().await?;
        self.initialized = false;
        Ok(())
    }

    /// Check if the SDK is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Get the SDK configuration
    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    /// Get the memory manager
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Get the provider router
    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Get the embedding generator
    pub fn embeddings(&self) -> &Arc<EmbeddingGenerator> {
        &self.embeddings
    }

    /// Run database migrations
    fn run_migrations(&self) -> StrataResult<()> {
        self.db.migrate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    use crate::config::ProviderConfig;
    use crate::context::RequestContext;
    use crate::memory::NewMemory;
    use crate::providers::{Capability, EchoCompletionProvider, HashEmbeddingProvider};
    use crate::{MemoryType, StrataError};

    fn offline_providers() -> Vec<ProviderHandle> {
        vec![
            ProviderHandle::new("hash").with_embedding(Arc::new(HashEmbeddingProvider::default())),
            ProviderHandle::new("echo").with_completion(Arc::new(EchoCompletionProvider::default())),
        ]
    }

    fn offline_config(config: StrataConfig) -> StrataConfig {
        config
            .with_provider(ProviderConfig::new("hash", 10, &[Capability::Embedding]))
            .with_provider(ProviderConfig::new("echo", 10, &[Capability::Completion]))
    }

    #[tokio::test]
    async fn test_sdk_creation() {
        let strata = assert_ok!(Strata::new(offline_config(StrataConfig::in_memory()), offline_providers()));
        assert!(!strata.is_initialized());
        assert_eq!(strata.router().descriptors().len(), 2);
    }

    #[tokio::test]
    async fn test_sdk_validation() {
        let config = StrataConfig::in_memory().with_provider(ProviderConfig::new("ghost", 1, &[Capability::Embedding]));
        let err = Strata::new(config, Vec::new()).err().unwrap();
        assert!(matches!(err, StrataError::Config(_)));
    }

    #[tokio::test]
    async fn test_lifecycle_persists_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("strata.db");
        let ctx = RequestContext::background();

        let mut strata = Strata::new(offline_config(StrataConfig::new(&path)), offline_providers()).unwrap();
        strata.initialize().await.unwrap();
        let id = strata
            .memory()
            .store(&ctx, NewMemory::new("water boils at 100C", MemoryType::SemanticMemory))
            .await
            .unwrap();
        strata.shutdown().await.unwrap();

        // A fresh instance reads the item back from the vector store
        let mut reopened = Strata::new(offline_config(StrataConfig::new(&path)), offline_providers()).unwrap();
        reopened.initialize().await.unwrap();
        let item = reopened.memory().retrieve(&ctx, &id).await.unwrap();
        assert_eq!(item.content, "water boils at 100C");
        assert_eq!(item.embedding.map(|e| e.len()), Some(8));
        reopened.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_completion_through_router() {
        let mut strata = Strata::new(offline_config(StrataConfig::in_memory()), offline_providers()).unwrap();
        strata.initialize().await.unwrap();
        let text = strata
            .router()
            .complete(&RequestContext::background(), "hello", &Default::default())
            .await
            .unwrap();
        assert_eq!(text, "[stub:stub] hello");
        strata.shutdown().await.unwrap();
    }
}
