//! strata-core - Core library for Strata
//!
//! This crate provides the pieces shared between the SDK and the CLI:
//!
//! - **types**: memory items, memory types, tiers and metadata
//! - **db**: durable SQLite storage for semantic-tier vector records
//! - **error**: core error type

pub mod db;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use db::{Database, UpsertOutcome, VectorRecord};
pub use error::{Error, Result};
pub use types::{MemoryItem, MemoryTier, MemoryType, Metadata, MetadataValue};
