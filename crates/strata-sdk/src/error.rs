//! SDK Error Types
//!
//! Defines the error taxonomy surfaced by the memory and provider APIs.

use std::fmt;

use thiserror::Error;

use crate::providers::{Capability, ProviderError};

/// SDK Result type alias
pub type StrataResult<T> = Result<T, StrataError>;

/// Why an operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The caller-supplied deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Last error seen from one provider during a fallback pass.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub attempts: u32,
    pub error: ProviderError,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} attempt(s)): {}", self.provider, self.attempts, self.error)
    }
}

fn describe_attempts(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no eligible provider".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// SDK errors
#[derive(Debug, Error)]
pub enum StrataError {
    /// Malformed input; never retried
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Every provider in the fallback chain failed
    #[error("no provider available for {capability}: {}", describe_attempts(.attempts))]
    ProviderUnavailable {
        capability: Capability,
        attempts: Vec<ProviderAttempt>,
    },

    /// Vector-store read or write failure
    #[error("persistence error for {id}: {message}")]
    Persistence { id: String, message: String },

    /// Caller cancelled or the deadline elapsed
    #[error("{operation} {reason}{}", .id.as_deref().map(|id| format!(" (id {})", id)).unwrap_or_default())]
    Cancelled {
        operation: &'static str,
        id: Option<String>,
        reason: CancelReason,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Core storage error
    #[error("core error: {0}")]
    Core(#[from] strata_core::Error),

    /// Invalid operation
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl StrataError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: &'static str, id: Option<&str>, reason: CancelReason) -> Self {
        Self::Cancelled {
            operation,
            id: id.map(String::from),
            reason,
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a cancellation or deadline error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if this error is an exhausted fallback chain
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    /// Check if this error is a persistence error
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StrataError::validation("unknown memory type: knowledge");
        assert!(err.is_validation());
        assert!(err.to_string().contains("knowledge"));

        let err = StrataError::not_found("MemoryItem", "123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("MemoryItem"));
        assert!(err.to_string().contains("123"));

        let err = StrataError::cancelled("retrieve", Some("abc"), CancelReason::DeadlineExceeded);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "retrieve deadline exceeded (id abc)");

        let err = StrataError::persistence("abc", "disk full");
        assert!(err.is_persistence());
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_provider_unavailable_lists_every_provider() {
        let err = StrataError::ProviderUnavailable {
            capability: Capability::Embedding,
            attempts: vec![
                ProviderAttempt {
                    provider: "primary".into(),
                    attempts: 3,
                    error: ProviderError::Timeout { after_ms: 500 },
                },
                ProviderAttempt {
                    provider: "backup".into(),
                    attempts: 1,
                    error: ProviderError::Http { status: 401, message: "bad key".into() },
                },
            ],
        };
        assert!(err.is_provider_unavailable());
        let msg = err.to_string();
        assert!(msg.contains("embedding"));
        assert!(msg.contains("primary (3 attempt(s))"));
        assert!(msg.contains("backup (1 attempt(s))"));
        assert!(msg.contains("bad key"));
    }

    #[test]
    fn test_provider_unavailable_without_candidates() {
        let err = StrataError::ProviderUnavailable {
            capability: Capability::Completion,
            attempts: Vec::new(),
        };
        assert!(err.to_string().contains("no eligible provider"));
    }
}
