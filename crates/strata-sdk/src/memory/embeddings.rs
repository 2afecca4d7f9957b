//! Embedding generation with a content-hash memo.
//!
//! Vectors come from the provider router's embedding chain. Results are
//! memoized by SHA-256 of the normalized text (trimmed, whitespace runs
//! collapsed), so repeated content costs one provider call. The memo is
//! bounded and evicts least recently used vectors.
//!
//! # Usage
//!
//! ```ignore
//! let generator = EmbeddingGenerator::new(router.clone(), 1024);
//! let vector = generator.embed(&RequestContext::background(), "hello world").await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::lru::LruStore;
use crate::context::RequestContext;
use crate::error::{StrataError, StrataResult};
use crate::providers::ProviderRouter;
use crate::utils::{content_hash, normalize_text};

/// Memoizing embedding front-end for the provider router.
pub struct EmbeddingGenerator {
    router: Arc<ProviderRouter>,
    memo: Mutex<LruStore<Arc<Vec<f32>>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingGenerator {
    pub fn new(router: Arc<ProviderRouter>, capacity: usize) -> Self {
        Self {
            router,
            memo: Mutex::new(LruStore::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Embedding for `text`, from the memo when possible.
    pub async fn embed(&self, ctx: &RequestContext, text: &str) -> StrataResult<Vec<f32>> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(StrataError::validation("cannot embed empty text"));
        }
        let key = content_hash(&normalized);

        if let Some(vector) = self.memo.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(vector.as_ref().clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Concurrent misses on the same text may both call out; the last
        // insert wins and both vectors are equivalent.
        let vector = self.router.embed(ctx, &normalized).await?;

        let mut memo = self.memo.lock();
        memo.insert(key, Arc::new(vector.clone()));
        while memo.len() > self.capacity {
            if let Some((evicted, _)) = memo.pop_lru() {
                debug!(key = %evicted, "evicted memoized embedding");
            }
        }
        Ok(vector)
    }

    /// Whether `text` currently has a memoized vector.
    pub fn is_cached(&self, text: &str) -> bool {
        let key = content_hash(&normalize_text(text));
        self.memo.lock().contains(&key)
    }

    pub fn len(&self) -> usize {
        self.memo.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, RouterConfig};
    use crate::providers::testing::ScriptedProvider;
    use crate::providers::{Capability, ProviderError, ProviderHandle};

    fn generator(provider: Arc<ScriptedProvider>, capacity: usize) -> EmbeddingGenerator {
        let mut router = ProviderRouter::new(&RouterConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            ..Default::default()
        });
        router
            .register(
                ProviderConfig::new("scripted", 1, &[Capability::Embedding]),
                ProviderHandle::new("scripted").with_embedding(provider),
            )
            .unwrap();
        EmbeddingGenerator::new(Arc::new(router), capacity)
    }

    #[tokio::test]
    async fn test_memoizes_by_normalized_text() {
        let provider = Arc::new(ScriptedProvider::healthy("scripted"));
        let generator = generator(provider.clone(), 8);
        let ctx = RequestContext::background();

        let a = generator.embed(&ctx, "hello world").await.unwrap();
        let b = generator.embed(&ctx, "  hello \n world ").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.calls(), 1);
        assert_eq!(generator.hits(), 1);
        assert_eq!(generator.misses(), 1);
        assert!(generator.is_cached("hello   world"));
    }

    #[tokio::test]
    async fn test_memo_is_bounded_lru() {
        let provider = Arc::new(ScriptedProvider::healthy("scripted"));
        let generator = generator(provider.clone(), 2);
        let ctx = RequestContext::background();

        generator.embed(&ctx, "one").await.unwrap();
        generator.embed(&ctx, "two").await.unwrap();
        generator.embed(&ctx, "one").await.unwrap();
        generator.embed(&ctx, "three").await.unwrap();

        assert_eq!(generator.len(), 2);
        assert!(generator.is_cached("one"));
        assert!(!generator.is_cached("two"));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_failures_are_not_memoized() {
        let provider = Arc::new(ScriptedProvider::healthy("scripted").with_script(vec![
            Err(ProviderError::InvalidResponse("garbled".into())),
        ]));
        let generator = generator(provider.clone(), 4);
        let ctx = RequestContext::background();

        let err = generator.embed(&ctx, "text").await.unwrap_err();
        assert!(err.is_provider_unavailable());
        assert!(generator.is_empty());

        generator.embed(&ctx, "text").await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let generator = generator(Arc::new(ScriptedProvider::healthy("scripted")), 4);
        let err = generator.embed(&RequestContext::background(), " \n ").await.unwrap_err();
        assert!(err.is_validation());
    }
}
