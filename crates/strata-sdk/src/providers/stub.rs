//! Offline providers.
//!
//! Deterministic stand-ins for development without network access. They are
//! also a reasonable last entry in a fallback chain.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{CompletionOptions, CompletionProvider, EmbeddingProvider, ProviderError};

/// Default vector width for hash embeddings
pub const DEFAULT_HASH_DIMENSIONS: usize = 8;

/// Deterministic embeddings derived from SHA-256 of the text.
///
/// Each component is one digest byte scaled into `[0, 1]`. Widths beyond one
/// digest chain further digests of the previous one.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

/// Hash `text` into a vector of `dimensions` floats in `[0, 1]`.
pub fn hash_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dimensions);
    let mut digest = Sha256::digest(text.as_bytes());

    while values.len() < dimensions {
        let take = (dimensions - values.len()).min(digest.len());
        values.extend(digest[..take].iter().map(|b| f32::from(*b) / 255.0));
        digest = Sha256::digest(digest);
    }

    values
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(hash_embedding(text, self.dimensions))
    }
}

/// Completion provider that echoes the prompt back, tagged with its name.
#[derive(Debug, Clone)]
pub struct EchoCompletionProvider {
    name: String,
}

impl EchoCompletionProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for EchoCompletionProvider {
    fn default() -> Self {
        Self::new("stub")
    }
}

#[async_trait]
impl CompletionProvider for EchoCompletionProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError> {
        let text = format!("[stub:{}] {}", self.name, prompt);
        // max_tokens bounds characters here; there is no tokenizer offline
        Ok(text.chars().take(options.max_tokens as usize).collect())
    }
}
