//! Database types for strata-core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{MemoryItem, MemoryType, Metadata};

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// A durable vector-store row, keyed by item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub memory_type: MemoryType,
    pub metadata: Metadata,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VectorRecord {
    /// Build a record from an item and the embedding to persist with it.
    pub fn from_item(item: &MemoryItem, embedding: Vec<f32>) -> Self {
        Self {
            id: item.id.clone(),
            content: item.content.clone(),
            embedding,
            memory_type: item.memory_type,
            metadata: item.metadata.clone(),
            version: item.version,
            created_at: item.created_at,
            updated_at: Utc::now(),
        }
    }

    /// Convert back into a memory item carrying the persisted embedding.
    pub fn into_item(self) -> MemoryItem {
        MemoryItem {
            id: self.id,
            content: self.content,
            memory_type: self.memory_type,
            metadata: self.metadata,
            created_at: self.created_at,
            embedding: Some(self.embedding),
            version: self.version,
        }
    }
}

/// Outcome of a versioned upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the id.
    Inserted,
    /// An older version was overwritten.
    Updated { previous_version: u64 },
    /// The stored version is equal or newer; nothing was written.
    Stale { stored_version: u64 },
}

impl UpsertOutcome {
    pub fn is_written(&self) -> bool {
        !matches!(self, Self::Stale { .. })
    }
}

/// Lightweight projection used for similarity scans.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub id: String,
    pub version: u64,
    pub embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Column Codecs
// ─────────────────────────────────────────────────────────────────────────────

/// Encode an embedding as little-endian f32 bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian f32 blob.
pub fn decode_embedding(id: &str, bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::invalid_record(
            id,
            format!("embedding blob length {} is not a multiple of 4", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub(crate) fn millis_to_datetime(id: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::invalid_record(id, format!("timestamp out of range: {}", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_codec() {
        let v = vec![0.25_f32, -1.5, 3.0];
        let bytes = encode_embedding(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_embedding("a", &bytes).unwrap(), v);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        let err = decode_embedding("item-1", &[0, 0, 128]).unwrap_err();
        assert!(err.to_string().contains("item-1"));
    }

    #[test]
    fn test_upsert_outcome_written() {
        assert!(UpsertOutcome::Inserted.is_written());
        assert!(UpsertOutcome::Updated { previous_version: 1 }.is_written());
        assert!(!UpsertOutcome::Stale { stored_version: 4 }.is_written());
    }
}
