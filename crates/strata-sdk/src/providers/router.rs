//! Sequential provider fallback.
//!
//! Providers are tried in ascending priority. Each candidate gets a fixed
//! per-call timeout and a bounded number of retries; its final outcome feeds
//! the health tracker. Fallback never fans out: at most one provider call is
//! in flight per request.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::health::{Admission, HealthState, ProviderHealthTracker};
use super::retry::{RetryConfig, RetryStrategy};
use super::{Capability, CompletionOptions, ProviderError, ProviderHandle, ProviderRequest, ProviderResponse};
use crate::config::{ConfigValidationError, ProviderConfig, RouterConfig};
use crate::context::RequestContext;
use crate::error::{ProviderAttempt, StrataError, StrataResult};

/// Public view of a registered provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub priority: u32,
    pub capabilities: Vec<Capability>,
    pub health: HealthState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

struct Registration {
    config: ProviderConfig,
    handle: ProviderHandle,
}

/// Routes completion and embedding requests through the provider chain.
pub struct ProviderRouter {
    providers: Vec<Registration>,
    health: Arc<ProviderHealthTracker>,
    retry: RetryStrategy,
    probe: RetryStrategy,
    call_timeout: Duration,
}

impl ProviderRouter {
    /// Create an empty router.
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            providers: Vec::new(),
            health: Arc::new(ProviderHealthTracker::new(config.health.clone())),
            retry: RetryStrategy::new(config.retry()),
            probe: RetryStrategy::new(RetryConfig {
                max_retries: 0,
                ..config.retry()
            }),
            call_timeout: config.call_timeout(),
        }
    }

    /// Build a router from configured descriptors, joining each with the
    /// implementation registered under the same name.
    ///
    /// Implementations without a descriptor are ignored.
    pub fn from_config(
        config: &RouterConfig,
        descriptors: &[ProviderConfig],
        handles: Vec<ProviderHandle>,
    ) -> Result<Self, ConfigValidationError> {
        let mut router = Self::new(config);
        let mut handles = handles;

        for descriptor in descriptors {
            let position = handles
                .iter()
                .position(|h| h.name == descriptor.name)
                .ok_or_else(|| ConfigValidationError::MissingProviderImplementation(descriptor.name.clone()))?;
            let handle = handles.swap_remove(position);
            router.register(descriptor.clone(), handle)?;
        }

        for unused in &handles {
            debug!(provider = %unused.name, "provider implementation has no descriptor; ignoring");
        }

        Ok(router)
    }

    /// Register one provider. Every declared capability must be implemented.
    pub fn register(&mut self, config: ProviderConfig, handle: ProviderHandle) -> Result<(), ConfigValidationError> {
        if self.providers.iter().any(|p| p.config.name == config.name) {
            return Err(ConfigValidationError::DuplicateProvider(config.name));
        }
        for capability in &config.capabilities {
            if !handle.supports(*capability) {
                return Err(ConfigValidationError::UnsupportedCapability {
                    name: config.name.clone(),
                    capability: *capability,
                });
            }
        }

        self.health.register(&config.name);
        self.providers.push(Registration { config, handle });
        // Stable sort keeps registration order among equal priorities
        self.providers.sort_by_key(|p| p.config.priority);
        Ok(())
    }

    /// Shared health tracker.
    pub fn health(&self) -> &Arc<ProviderHealthTracker> {
        &self.health
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Registered providers in priority order, with their current health.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.providers
            .iter()
            .map(|p| {
                let snapshot = self.health.snapshot(&p.config.name);
                ProviderDescriptor {
                    name: p.config.name.clone(),
                    priority: p.config.priority,
                    capabilities: p.config.capabilities.clone(),
                    health: snapshot.map(|s| s.state).unwrap_or_default(),
                    consecutive_failures: snapshot.map(|s| s.consecutive_failures).unwrap_or(0),
                    consecutive_successes: snapshot.map(|s| s.consecutive_successes).unwrap_or(0),
                }
            })
            .collect()
    }

    /// Generate a completion.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        options: &CompletionOptions,
    ) -> StrataResult<String> {
        let request = ProviderRequest::Complete {
            prompt: prompt.to_string(),
            options: options.clone(),
        };
        match self.invoke(ctx, &request).await? {
            ProviderResponse::Text(text) => Ok(text),
            ProviderResponse::Embedding(_) => Err(mismatched(Capability::Completion)),
        }
    }

    /// Generate an embedding.
    pub async fn embed(&self, ctx: &RequestContext, text: &str) -> StrataResult<Vec<f32>> {
        let request = ProviderRequest::Embed { text: text.to_string() };
        match self.invoke(ctx, &request).await? {
            ProviderResponse::Embedding(vector) => Ok(vector),
            ProviderResponse::Text(_) => Err(mismatched(Capability::Embedding)),
        }
    }

    /// Send a request down the fallback chain.
    pub async fn invoke(&self, ctx: &RequestContext, request: &ProviderRequest) -> StrataResult<ProviderResponse> {
        let capability = request.capability();
        if let ProviderRequest::Complete { options, .. } = request {
            options
                .validate()
                .map_err(|e| StrataError::validation(e.to_string()))?;
        }

        let mut attempts = Vec::new();

        for provider in self.providers.iter().filter(|p| p.config.capabilities.contains(&capability)) {
            let name = provider.config.name.as_str();
            let strategy = match self.health.admit(name) {
                Admission::Normal => &self.retry,
                Admission::Probe => {
                    debug!(provider = name, "probing unavailable provider");
                    &self.probe
                }
                Admission::Skip => {
                    debug!(provider = name, "skipping unavailable provider");
                    continue;
                }
            };

            let handle = &provider.handle;
            let timeout = self.call_timeout;
            let outcome = strategy
                .execute(ctx, "provider call", ProviderError::is_retryable, move |_| async move {
                    call_with_timeout(handle, request, timeout).await
                })
                .await?;

            match outcome {
                Ok(response) => {
                    self.health.record_success(name);
                    return Ok(response);
                }
                Err(failure) => {
                    self.health.record_failure(name);
                    warn!(
                        provider = name,
                        capability = %capability,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "provider failed, trying next in chain"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name.to_string(),
                        attempts: failure.attempts,
                        error: failure.error,
                    });
                }
            }
        }

        Err(StrataError::ProviderUnavailable { capability, attempts })
    }
}

async fn call_with_timeout(
    handle: &ProviderHandle,
    request: &ProviderRequest,
    timeout: Duration,
) -> Result<ProviderResponse, ProviderError> {
    let response = tokio::time::timeout(timeout, handle.call(request))
        .await
        .map_err(|_| ProviderError::Timeout {
            after_ms: timeout.as_millis() as u64,
        })??;

    if let ProviderResponse::Embedding(vector) = &response {
        if vector.is_empty() {
            return Err(ProviderError::InvalidResponse("empty embedding".into()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(ProviderError::InvalidResponse("embedding contains non-finite values".into()));
        }
    }
    Ok(response)
}

fn mismatched(capability: Capability) -> StrataError {
    StrataError::invalid_operation(format!("provider returned the wrong response kind for {}", capability))
}
