//! SDK Configuration
//!
//! Configuration is owned by the embedding application. The SDK only reads
//! it at construction time; it never parses files or environment variables.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::Capability;
use crate::{MemoryTier, RetryConfig};

/// Path value that selects a private in-memory database
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// SDK configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Path to the SQLite vector store (default: "strata.db")
    pub database_path: PathBuf,

    /// Tier capacities and memo sizes
    pub memory: MemoryConfig,

    /// Vector-store write queue settings
    pub vector_store: VectorStoreConfig,

    /// Provider timeout, retry and health settings
    pub router: RouterConfig,

    /// Provider descriptors: name, priority, capabilities, credentials reference
    pub providers: Vec<ProviderConfig>,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("strata.db"),
            memory: MemoryConfig::default(),
            vector_store: VectorStoreConfig::default(),
            router: RouterConfig::default(),
            providers: Vec::new(),
        }
    }
}

/// Capacity of one tier. Eviction starts when either bound is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapacity {
    /// Maximum number of cached items
    pub max_items: usize,

    /// Optional byte budget over the approximate item footprint
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

impl TierCapacity {
    pub fn items(max_items: usize) -> Self {
        Self { max_items, max_bytes: None }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
}

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Short-term tier capacity (default: 100 items)
    pub short_term: TierCapacity,

    /// Episodic tier capacity (default: 500 items)
    pub episodic: TierCapacity,

    /// Semantic tier cache capacity (default: 1000 items)
    pub semantic: TierCapacity,

    /// Maximum memoized embeddings (default: 1024)
    pub embedding_cache_capacity: usize,

    /// Number of per-key lock shards (default: 64)
    pub key_lock_shards: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term: TierCapacity::items(100),
            episodic: TierCapacity::items(500),
            semantic: TierCapacity::items(1000),
            embedding_cache_capacity: 1024,
            key_lock_shards: 64,
        }
    }
}

impl MemoryConfig {
    /// Capacity configured for a tier
    pub fn capacity(&self, tier: MemoryTier) -> TierCapacity {
        match tier {
            MemoryTier::ShortTerm => self.short_term,
            MemoryTier::Episodic => self.episodic,
            MemoryTier::Semantic => self.semantic,
        }
    }
}

/// Vector store write-queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Bounded queue length; `store` blocks when full (default: 256)
    pub queue_capacity: usize,

    /// Maximum writes drained and coalesced per batch (default: 32)
    pub batch_size: usize,

    /// Attempts per batch before reporting a persistence failure (default: 5)
    pub max_write_attempts: u32,

    /// First retry delay in milliseconds (default: 100)
    pub retry_initial_delay_ms: u64,

    /// Retry delay cap in milliseconds (default: 5000)
    pub retry_max_delay_ms: u64,

    /// Records fetched per page when a query scans the store (default: 64)
    pub query_page_size: usize,

    /// Buffered persistence-failure notifications (default: 64)
    pub failure_channel_capacity: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            batch_size: 32,
            max_write_attempts: 5,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 5000,
            query_page_size: 64,
            failure_channel_capacity: 64,
        }
    }
}

impl VectorStoreConfig {
    /// Backoff schedule for failed batches
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_write_attempts.saturating_sub(1),
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: 2.0,
            jitter_enabled: false,
        }
    }
}

/// Provider router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-call timeout in milliseconds (default: 30000)
    pub call_timeout_ms: u64,

    /// Retries per provider after the first attempt (default: 2)
    pub max_retries: u32,

    /// First backoff delay in milliseconds (default: 250)
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds (default: 4000)
    pub max_backoff_ms: u64,

    /// Backoff growth factor (default: 2.0)
    pub backoff_multiplier: f64,

    /// Randomize backoff delays (default: false)
    pub jitter: bool,

    /// Health state machine thresholds
    pub health: HealthConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            max_retries: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            backoff_multiplier: 2.0,
            jitter: false,
            health: HealthConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Backoff schedule for provider retries
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_enabled: self.jitter,
        }
    }
}

/// Provider health thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before Healthy → Degraded (default: 3)
    pub degraded_after: u32,

    /// Further consecutive failures before Degraded → Unavailable (default: 3)
    pub unavailable_after: u32,

    /// Consecutive successes before returning to Healthy (default: 2)
    pub recovery_successes: u32,

    /// Minimum interval between probes of an Unavailable provider in
    /// milliseconds (default: 30000)
    pub probe_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: 3,
            unavailable_after: 3,
            recovery_successes: 2,
            probe_interval_ms: 30_000,
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// Descriptor for one configured provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, matched against registered implementations
    pub name: String,

    /// Lower is tried first
    pub priority: u32,

    /// Capabilities this provider is allowed to serve
    pub capabilities: Vec<Capability>,

    /// Name of the secret the embedding application resolves for this provider
    #[serde(default)]
    pub credentials_ref: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, priority: u32, capabilities: &[Capability]) -> Self {
        Self {
            name: name.into(),
            priority,
            capabilities: capabilities.to_vec(),
            credentials_ref: None,
        }
    }

    pub fn with_credentials_ref(mut self, reference: impl Into<String>) -> Self {
        self.credentials_ref = Some(reference.into());
        self
    }
}

impl StrataConfig {
    /// Create a new config with the given database path
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Config backed by a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY_DATABASE)
    }

    /// Whether the database path selects an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_DATABASE
    }

    /// Set memory configuration
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Set vector store configuration
    pub fn with_vector_store(mut self, vector_store: VectorStoreConfig) -> Self {
        self.vector_store = vector_store;
        self
    }

    /// Set router configuration
    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Add a provider descriptor
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingDatabasePath);
        }

        for tier in MemoryTier::ALL {
            let capacity = self.memory.capacity(tier);
            if capacity.max_items == 0 {
                return Err(invalid(format!("memory.{}.max_items", tier), "must be greater than 0"));
            }
            if capacity.max_bytes == Some(0) {
                return Err(invalid(format!("memory.{}.max_bytes", tier), "must be greater than 0"));
            }
        }

        if self.memory.embedding_cache_capacity == 0 {
            return Err(invalid("memory.embedding_cache_capacity", "must be greater than 0"));
        }
        if self.memory.key_lock_shards == 0 {
            return Err(invalid("memory.key_lock_shards", "must be greater than 0"));
        }

        let vs = &self.vector_store;
        if vs.queue_capacity == 0 {
            return Err(invalid("vector_store.queue_capacity", "must be greater than 0"));
        }
        if vs.batch_size == 0 {
            return Err(invalid("vector_store.batch_size", "must be greater than 0"));
        }
        if vs.max_write_attempts == 0 {
            return Err(invalid("vector_store.max_write_attempts", "must be at least 1"));
        }
        if vs.retry_max_delay_ms < vs.retry_initial_delay_ms {
            return Err(invalid(
                "vector_store.retry_max_delay_ms",
                "must not be below retry_initial_delay_ms",
            ));
        }
        if vs.query_page_size == 0 {
            return Err(invalid("vector_store.query_page_size", "must be greater than 0"));
        }
        if vs.failure_channel_capacity == 0 {
            return Err(invalid("vector_store.failure_channel_capacity", "must be greater than 0"));
        }

        let router = &self.router;
        if router.call_timeout_ms == 0 {
            return Err(invalid("router.call_timeout_ms", "must be greater than 0"));
        }
        if !(router.backoff_multiplier >= 1.0) {
            return Err(invalid("router.backoff_multiplier", "must be at least 1.0"));
        }
        if router.max_backoff_ms < router.initial_backoff_ms {
            return Err(invalid("router.max_backoff_ms", "must not be below initial_backoff_ms"));
        }
        let health = &router.health;
        if health.degraded_after == 0 || health.unavailable_after == 0 || health.recovery_successes == 0 {
            return Err(invalid("router.health", "thresholds must be greater than 0"));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(invalid("providers.name", "must not be empty"));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigValidationError::DuplicateProvider(provider.name.clone()));
            }
            if provider.capabilities.is_empty() {
                return Err(invalid(
                    format!("providers.{}.capabilities", provider.name),
                    "must declare at least one capability",
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigValidationError {
    ConfigValidationError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("database_path is required")]
    MissingDatabasePath,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("provider configured twice: {0}")]
    DuplicateProvider(String),

    #[error("provider {0} is configured but no implementation was registered")]
    MissingProviderImplementation(String),

    #[error("provider {name} declares {capability} but its implementation does not support it")]
    UnsupportedCapability { name: String, capability: Capability },
}
