//! Hashing Utilities

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of content and return as hex string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Trim and collapse internal whitespace runs to a single space
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash of the normalized text; the embedding memo key
pub fn normalized_hash(text: &str) -> String {
    content_hash(&normalize_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), 64); // SHA-256 produces 64 hex chars

        // Same input should produce same hash
        assert_eq!(content_hash("hello world"), content_hash("hello world"));

        // Different input should produce different hash
        assert_ne!(content_hash("hello world"), content_hash("hello world!"));
    }

    #[test]
    fn test_normalized_hash_ignores_whitespace_layout() {
        assert_eq!(normalize_text("  hello \n\t world  "), "hello world");
        assert_eq!(normalized_hash("hello world"), normalized_hash(" hello   world\n"));
        assert_ne!(normalized_hash("hello world"), normalized_hash("Hello world"));
    }
}
