//! Shared types for strata-core.
//!
//! These types are used by both the SDK memory layer and the database layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Tiers
// ─────────────────────────────────────────────────────────────────────────────

/// Memory tier, ordered by rank (short-term is probed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    ShortTerm,
    Episodic,
    Semantic,
}

impl MemoryTier {
    /// All tiers in rank order.
    pub const ALL: [MemoryTier; 3] = [Self::ShortTerm, Self::Episodic, Self::Semantic];

    /// Rank of the tier (0 = probed first).
    pub fn rank(&self) -> usize {
        match self {
            Self::ShortTerm => 0,
            Self::Episodic => 1,
            Self::Semantic => 2,
        }
    }

    /// Whether items of this tier have a durable copy in the vector store.
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Semantic)
    }

    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "short_term" | "short-term" | "short" => Some(Self::ShortTerm),
            "episodic" => Some(Self::Episodic),
            "semantic" | "long_term" | "long-term" => Some(Self::Semantic),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Types
// ─────────────────────────────────────────────────────────────────────────────

/// Memory type tag. Determines the tier an item lives in and never changes
/// after the item is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryType {
    #[serde(rename = "context", alias = "ContextMemory")]
    ContextMemory,
    #[serde(rename = "episodic", alias = "EpisodicMemory")]
    EpisodicMemory,
    #[serde(rename = "semantic", alias = "SemanticMemory")]
    SemanticMemory,
    #[serde(rename = "working", alias = "WorkingMemory")]
    WorkingMemory,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        Self::ContextMemory,
        Self::EpisodicMemory,
        Self::SemanticMemory,
        Self::WorkingMemory,
    ];

    /// Tier this memory type is routed to.
    pub fn tier(&self) -> MemoryTier {
        match self {
            Self::ContextMemory | Self::WorkingMemory => MemoryTier::ShortTerm,
            Self::EpisodicMemory => MemoryTier::Episodic,
            Self::SemanticMemory => MemoryTier::Semantic,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextMemory => "context",
            Self::EpisodicMemory => "episodic",
            Self::SemanticMemory => "semantic",
            Self::WorkingMemory => "working",
        }
    }
}

impl FromStr for MemoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "context" | "ContextMemory" | "context_memory" => Ok(Self::ContextMemory),
            "episodic" | "EpisodicMemory" | "episodic_memory" => Ok(Self::EpisodicMemory),
            "semantic" | "SemanticMemory" | "semantic_memory" => Ok(Self::SemanticMemory),
            "working" | "WorkingMemory" | "working_memory" => Ok(Self::WorkingMemory),
            other => Err(Error::UnknownMemoryType(other.to_string())),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Infer a scalar from its textual form (`true`, `42`, `0.5`, anything else is text).
    pub fn infer(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return Self::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Text(raw.to_string())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Approximate in-memory footprint, used for byte-budgeted tiers.
    pub fn approx_size(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            _ => 8,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for MetadataValue {
    fn from(v: i32) -> Self {
        Self::Integer(v.into())
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Item metadata. Keyed by name; ordering carries no meaning.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Items
// ─────────────────────────────────────────────────────────────────────────────

/// A stored memory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub version: u64,
}

impl MemoryItem {
    /// Tier the item is routed to.
    pub fn tier(&self) -> MemoryTier {
        self.memory_type.tier()
    }

    /// Approximate in-memory footprint in bytes.
    pub fn approx_size(&self) -> usize {
        let metadata: usize = self
            .metadata
            .iter()
            .map(|(k, v)| k.len() + v.approx_size())
            .sum();
        let embedding = self.embedding.as_ref().map(|e| e.len() * 4).unwrap_or(0);
        self.id.len() + self.content.len() + metadata + embedding
    }
}
