//! Configuration management for strata.
//!
//! Configuration is loaded with precedence:
//! 1. `--config <path>` / `$STRATA_CONFIG`
//! 2. Config file (`<data dir>/config.toml`)
//! 3. Default values (local database, offline stub provider)
//!
//! The SDK sections (`memory`, `vector_store`, `router`) deserialize straight
//! into the SDK's own types. `[[providers]]` entries add what the CLI needs to
//! build the implementations: the provider kind, endpoint, model names and
//! the environment variable holding the API key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use strata_sdk::providers::stub::DEFAULT_HASH_DIMENSIONS;
use strata_sdk::{
    Capability, EchoCompletionProvider, HashEmbeddingProvider, MemoryConfig, OpenAiCompatibleProvider,
    OpenAiSettings, ProviderConfig, ProviderHandle, RouterConfig, StrataConfig, VectorStoreConfig,
};
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite vector store path
    pub database_path: PathBuf,

    /// Tier capacities and memo sizes
    pub memory: MemoryConfig,

    /// Write queue settings
    pub vector_store: VectorStoreConfig,

    /// Provider timeout, retry and health settings
    pub router: RouterConfig,

    /// Provider chain, tried in ascending priority
    pub providers: Vec<ProviderEntry>,
}

/// Kind of provider implementation to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible HTTP endpoint (OpenAI, LM Studio, OpenRouter)
    Openai,
    /// Offline hash embeddings and echo completions
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,

    pub kind: ProviderKind,

    /// Lower is tried first
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Capabilities to serve; empty means everything the kind supports
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// API base URL (openai only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key (openai only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Vector width (stub only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

fn default_priority() -> u32 {
    100
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "strata", "strata") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".strata")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join("strata.db"),
            memory: MemoryConfig::default(),
            vector_store: VectorStoreConfig::default(),
            router: RouterConfig::default(),
            providers: vec![ProviderEntry::stub("local", default_priority())],
        }
    }
}

impl ProviderEntry {
    /// Offline provider serving both capabilities.
    pub fn stub(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Stub,
            priority,
            capabilities: Vec::new(),
            base_url: None,
            api_key_env: None,
            completion_model: None,
            embedding_model: None,
            dimensions: None,
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        if self.capabilities.is_empty() {
            vec![Capability::Completion, Capability::Embedding]
        } else {
            self.capabilities.clone()
        }
    }

    /// SDK descriptor for this entry.
    pub fn descriptor(&self) -> ProviderConfig {
        let descriptor = ProviderConfig::new(&self.name, self.priority, &self.capabilities());
        match &self.api_key_env {
            Some(var) => descriptor.with_credentials_ref(var),
            None => descriptor,
        }
    }

    /// Build the implementation, resolving the API key from the environment.
    pub fn handle(&self) -> Result<ProviderHandle> {
        let handle = ProviderHandle::new(&self.name);
        match self.kind {
            ProviderKind::Stub => {
                let dimensions = self.dimensions.unwrap_or(DEFAULT_HASH_DIMENSIONS);
                if dimensions == 0 {
                    bail!("provider {}: dimensions must be greater than 0", self.name);
                }
                Ok(handle
                    .with_completion(Arc::new(EchoCompletionProvider::new(&self.name)))
                    .with_embedding(Arc::new(HashEmbeddingProvider::new(dimensions))))
            }
            ProviderKind::Openai => {
                let mut settings = OpenAiSettings::default();
                if let Some(url) = &self.base_url {
                    settings.base_url = url.clone();
                }
                if let Some(model) = &self.completion_model {
                    settings.completion_model = model.clone();
                }
                if let Some(model) = &self.embedding_model {
                    settings.embedding_model = model.clone();
                }
                if let Some(var) = &self.api_key_env {
                    settings.api_key = std::env::var(var).ok();
                    if settings.api_key.is_none() {
                        warn!(provider = %self.name, env = %var, "API key variable is not set; calling without credentials");
                    }
                }
                Ok(handle.with_both(Arc::new(OpenAiCompatibleProvider::new(settings))))
            }
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };

        if !config_path.exists() {
            if explicit {
                bail!("Config file not found: {}", config_path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    /// Get the default config file path.
    pub fn config_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }

    /// SDK configuration for this CLI configuration.
    pub fn strata_config(&self) -> StrataConfig {
        StrataConfig {
            database_path: self.database_path.clone(),
            memory: self.memory.clone(),
            vector_store: self.vector_store.clone(),
            router: self.router.clone(),
            providers: self.providers.iter().map(ProviderEntry::descriptor).collect(),
        }
    }

    /// Provider implementations for every entry.
    pub fn provider_handles(&self) -> Result<Vec<ProviderHandle>> {
        self.providers.iter().map(ProviderEntry::handle).collect()
    }

    /// Ensure the database directory exists.
    pub fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
            }
        }
        Ok(())
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database_path.ends_with("strata.db"));
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, ProviderKind::Stub);

        let sdk = config.strata_config();
        assert!(sdk.validate().is_ok());
        assert_eq!(sdk.providers[0].capabilities.len(), 2);
    }

    #[test]
    fn test_load_provider_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/strata-test.db"

[memory.short_term]
max_items = 10

[router]
call_timeout_ms = 5000

[[providers]]
name = "openai"
kind = "openai"
priority = 1
capabilities = ["completion", "embedding"]
api_key_env = "STRATA_TEST_UNSET_KEY"

[[providers]]
name = "offline"
kind = "stub"
priority = 50
dimensions = 16
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.memory.short_term.max_items, 10);
        // Unspecified sections keep their defaults
        assert_eq!(config.memory.episodic.max_items, 500);
        assert_eq!(config.router.call_timeout_ms, 5000);
        assert_eq!(config.providers.len(), 2);

        let sdk = config.strata_config();
        assert_eq!(sdk.providers[0].credentials_ref.as_deref(), Some("STRATA_TEST_UNSET_KEY"));

        let handles = config.provider_handles().unwrap();
        assert!(handles[0].supports(Capability::Embedding));
        assert!(handles[1].supports(Capability::Completion));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_unknown_provider_kind_is_rejected() {
        let parsed: std::result::Result<Config, _> = toml::from_str(
            r#"
[[providers]]
name = "x"
kind = "carrier-pigeon"
"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.providers[0].name, "local");
        assert_eq!(parsed.vector_store.queue_capacity, config.vector_store.queue_capacity);
    }
}
