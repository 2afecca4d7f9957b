//! LLM provider capabilities and the fallback router.
//!
//! Providers are external completion/embedding services. Each one implements
//! one or both capability traits and is registered with the
//! [`ProviderRouter`] under a name, a priority and a declared capability set.
//!
//! ```text
//!   complete()/embed()
//!          │
//!   ┌──────▼───────┐  priority order, skip Unavailable / missing capability
//!   │ProviderRouter│──────────────────────────────────────────────┐
//!   └──────┬───────┘                                              │
//!          │ timeout + retry/backoff per provider                 │
//!   ┌──────▼──────┐   ┌──────────────┐   ┌──────────────┐         │
//!   │ provider #1 │──▶│ provider #2  │──▶│ provider #n  │──▶ ProviderUnavailable
//!   └──────┬──────┘   └──────────────┘   └──────────────┘
//!          │ outcome
//!   ┌──────▼───────────────┐
//!   │ProviderHealthTracker │
//!   └──────────────────────┘
//! ```

pub mod health;
pub mod retry;
pub mod router;
pub mod stub;

#[cfg(feature = "http-providers")]
pub mod openai;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use health::{Admission, HealthSnapshot, HealthState, ProviderHealthTracker};
pub use retry::{RetryConfig, RetryFailure, RetryStrategy};
pub use router::{ProviderDescriptor, ProviderRouter};
pub use stub::{EchoCompletionProvider, HashEmbeddingProvider};

#[cfg(feature = "http-providers")]
pub use openai::{OpenAiCompatibleProvider, OpenAiSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────────────────

/// What a provider can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Completion,
    Embedding,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Embedding => "embedding",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completion" | "complete" => Some(Self::Completion),
            "embedding" | "embed" => Some(Self::Embedding),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0} not supported")]
    Unsupported(Capability),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Whether retrying the same provider may succeed.
    ///
    /// Timeouts, transport errors, rate limits and server errors are
    /// transient; authentication and request errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Unsupported(_) | Self::InvalidRequest(_) => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Options for a completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature, 0.0 to 2.0 (default: 0.7)
    pub temperature: f32,
    /// Response token limit (default: 1024)
    pub max_tokens: u32,
    /// Model override; providers fall back to their configured model
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            model: None,
        }
    }
}

impl CompletionOptions {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ProviderError::InvalidRequest(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ProviderError::InvalidRequest("max_tokens must be positive".into()));
        }
        Ok(())
    }
}

/// A request routed through the provider chain.
#[derive(Debug, Clone)]
pub enum ProviderRequest {
    Complete { prompt: String, options: CompletionOptions },
    Embed { text: String },
}

impl ProviderRequest {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Complete { .. } => Capability::Completion,
            Self::Embed { .. } => Capability::Embedding,
        }
    }
}

/// A provider's answer to a [`ProviderRequest`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    Text(String),
    Embedding(Vec<f32>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Text completion capability.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError>;
}

/// Embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Capability implementations registered under one provider name.
#[derive(Clone)]
pub struct ProviderHandle {
    pub name: String,
    pub completion: Option<Arc<dyn CompletionProvider>>,
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
}

impl ProviderHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completion: None,
            embedding: None,
        }
    }

    pub fn with_completion(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completion = Some(provider);
        self
    }

    pub fn with_embedding(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    /// Register one value as both capabilities.
    pub fn with_both<P>(self, provider: Arc<P>) -> Self
    where
        P: CompletionProvider + EmbeddingProvider + 'static,
    {
        self.with_completion(provider.clone()).with_embedding(provider)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Completion => self.completion.is_some(),
            Capability::Embedding => self.embedding.is_some(),
        }
    }

    /// Dispatch a request to the matching capability.
    pub(crate) async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match request {
            ProviderRequest::Complete { prompt, options } => {
                let provider = self
                    .completion
                    .as_ref()
                    .ok_or(ProviderError::Unsupported(Capability::Completion))?;
                provider.complete(prompt, options).await.map(ProviderResponse::Text)
            }
            ProviderRequest::Embed { text } => {
                let provider = self
                    .embedding
                    .as_ref()
                    .ok_or(ProviderError::Unsupported(Capability::Embedding))?;
                provider.embed(text).await.map(ProviderResponse::Embedding)
            }
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("name", &self.name)
            .field("completion", &self.completion.is_some())
            .field("embedding", &self.embedding.is_some())
            .finish()
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
