//! Memory API input and reporting types.

use serde::{Deserialize, Serialize};
use strata_core::{MemoryItem, MemoryTier, MemoryType, Metadata, MetadataValue};

use crate::error::{StrataError, StrataResult};
use crate::utils::{validate_embedding, validate_item_id, validate_metadata};

/// Parse a memory type name, rejecting unknown names as a validation error.
pub fn parse_memory_type(name: &str) -> StrataResult<MemoryType> {
    name.parse::<MemoryType>()
        .map_err(|_| StrataError::validation(format!("unknown memory type: {}", name.trim())))
}

/// Input for `MemoryManager::store`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    /// Caller-supplied id; a UUID v4 is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub metadata: Metadata,
    /// Precomputed embedding; semantic items without one are embedded by
    /// the write queue
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            id: None,
            content: content.into(),
            memory_type,
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    /// Build from a textual memory type.
    pub fn parse(content: impl Into<String>, memory_type: &str) -> StrataResult<Self> {
        Ok(Self::new(content, parse_memory_type(memory_type)?))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Structural checks; nothing here touches storage.
    pub fn validate(&self) -> StrataResult<()> {
        if let Some(id) = &self.id {
            validate_item_id(id)?;
        }
        if self.content.trim().is_empty() {
            return Err(StrataError::validation("content cannot be empty"));
        }
        validate_metadata(&self.metadata)?;
        if let Some(embedding) = &self.embedding {
            validate_embedding(embedding)?;
        }
        Ok(())
    }
}

/// A vector-store hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub item: MemoryItem,
    /// Cosine similarity to the query vector
    pub score: f32,
}

/// A semantic write that the queue gave up on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceFailure {
    pub id: String,
    pub version: u64,
    pub attempts: u32,
    pub error: String,
}

/// Counters for one cache tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierStats {
    pub tier: MemoryTier,
    pub items: usize,
    pub bytes: usize,
    pub max_items: usize,
    pub max_bytes: Option<usize>,
    pub pinned: usize,
    pub hits: u64,
    pub evictions: u64,
}

/// Snapshot of the whole memory system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub tiers: Vec<TierStats>,
    /// Lookups that found the id in no tier
    pub cache_misses: u64,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
    pub embedding_cache_size: usize,
    pub pending_writes: usize,
    pub persisted_writes: u64,
    pub persistence_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_type() {
        assert_eq!(parse_memory_type("semantic").unwrap(), MemoryType::SemanticMemory);
        let err = parse_memory_type("knowledge").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("knowledge"));
    }

    #[test]
    fn test_new_memory_builder() {
        let input = NewMemory::parse("remember this", "episodic")
            .unwrap()
            .with_id("ep-1")
            .with_metadata("source", "chat")
            .with_metadata("turn", 3i64);
        assert_eq!(input.memory_type, MemoryType::EpisodicMemory);
        assert_eq!(input.metadata.len(), 2);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_new_memory_validation() {
        assert!(NewMemory::new("   ", MemoryType::ContextMemory).validate().is_err());
        assert!(NewMemory::new("x", MemoryType::ContextMemory).with_id("").validate().is_err());
        assert!(NewMemory::new("x", MemoryType::ContextMemory)
            .with_embedding(vec![])
            .validate()
            .is_err());
        assert!(NewMemory::new("x", MemoryType::ContextMemory)
            .with_metadata("", true)
            .validate()
            .is_err());
    }

    #[test]
    fn test_new_memory_deserializes_with_defaults() {
        let input: NewMemory = serde_json::from_str(r#"{"content":"c","memory_type":"working"}"#).unwrap();
        assert_eq!(input.memory_type, MemoryType::WorkingMemory);
        assert!(input.id.is_none());
        assert!(input.metadata.is_empty());
    }
}
