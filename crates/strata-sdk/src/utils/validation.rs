//! Validation Utilities
//!
//! Structural checks applied to memory items before they reach a tier.

use strata_core::Metadata;
use thiserror::Error;

use crate::error::StrataError;

/// Longest accepted item id, in bytes
pub const MAX_ID_LEN: usize = 256;

/// Longest accepted metadata key, in bytes
pub const MAX_METADATA_KEY_LEN: usize = 128;

/// Validation error types
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Field required: {0}")]
    Required(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl From<ValidationError> for StrataError {
    fn from(err: ValidationError) -> Self {
        StrataError::validation(err.to_string())
    }
}

/// Validate an item id
///
/// Valid ids are:
/// - 1-256 bytes
/// - Not blank
/// - Free of control characters
pub fn validate_item_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required("id cannot be empty".into()));
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::InvalidId(format!(
            "id must be {} bytes or less",
            MAX_ID_LEN
        )));
    }

    if let Some((i, c)) = id.char_indices().find(|(_, c)| c.is_control()) {
        return Err(ValidationError::InvalidId(format!(
            "control character {:?} at position {}",
            c, i
        )));
    }

    Ok(())
}

/// Validate metadata keys and values
pub fn validate_metadata(metadata: &Metadata) -> Result<(), ValidationError> {
    for (key, value) in metadata {
        if key.trim().is_empty() {
            return Err(ValidationError::Required("metadata key cannot be empty".into()));
        }
        if key.len() > MAX_METADATA_KEY_LEN {
            return Err(ValidationError::OutOfRange(format!(
                "metadata key '{}' exceeds {} bytes",
                key, MAX_METADATA_KEY_LEN
            )));
        }
        if let strata_core::MetadataValue::Float(f) = value {
            if !f.is_finite() {
                return Err(ValidationError::InvalidFormat(format!(
                    "metadata value for '{}' is not finite",
                    key
                )));
            }
        }
    }
    Ok(())
}

/// Validate a caller-supplied embedding
pub fn validate_embedding(embedding: &[f32]) -> Result<(), ValidationError> {
    if embedding.is_empty() {
        return Err(ValidationError::Required("embedding cannot be empty".into()));
    }
    if let Some(i) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::InvalidFormat(format!(
            "embedding component {} is not finite",
            i
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::MetadataValue;

    #[test]
    fn test_validate_item_id_valid() {
        assert!(validate_item_id("a").is_ok());
        assert!(validate_item_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_item_id("notes/2024 Q1").is_ok());
        assert!(validate_item_id(&"x".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn test_validate_item_id_invalid() {
        assert!(validate_item_id("").is_err());
        assert!(validate_item_id("   ").is_err());
        assert!(validate_item_id("line\nbreak").is_err());
        assert!(validate_item_id(&"x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from("chat"));
        metadata.insert("score".into(), MetadataValue::from(0.5));
        assert!(validate_metadata(&metadata).is_ok());

        metadata.insert(" ".into(), MetadataValue::from(true));
        assert!(validate_metadata(&metadata).is_err());

        let mut metadata = Metadata::new();
        metadata.insert("bad".into(), MetadataValue::Float(f64::NAN));
        assert!(validate_metadata(&metadata).is_err());
    }

    #[test]
    fn test_validate_embedding() {
        assert!(validate_embedding(&[0.1, 0.2]).is_ok());
        assert!(validate_embedding(&[]).is_err());
        assert!(validate_embedding(&[0.1, f32::INFINITY]).is_err());
    }

    #[test]
    fn test_converts_to_sdk_validation_error() {
        let err: StrataError = validate_item_id("").unwrap_err().into();
        assert!(err.is_validation());
    }
}
