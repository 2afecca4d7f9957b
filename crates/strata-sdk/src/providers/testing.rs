//! Scripted provider double for router and memory tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::stub::hash_embedding;
use super::{CompletionOptions, CompletionProvider, EmbeddingProvider, ProviderError};

/// Replays a script of outcomes, then repeats a fallback outcome forever.
pub(crate) struct ScriptedProvider {
    name: String,
    script: parking_lot::Mutex<VecDeque<Result<(), ProviderError>>>,
    fallback: Result<(), ProviderError>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn healthy(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: parking_lot::Mutex::new(VecDeque::new()),
            fallback: Ok(()),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::healthy(name)
        }
    }

    /// Outcomes returned before the fallback takes over.
    pub fn with_script(self, outcomes: Vec<Result<(), ProviderError>>) -> Self {
        *self.script.lock() = outcomes.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next_outcome(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String, ProviderError> {
        self.next_outcome().await?;
        Ok(format!("{}: {}", self.name, prompt))
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.next_outcome().await?;
        Ok(hash_embedding(text, 8))
    }
}
