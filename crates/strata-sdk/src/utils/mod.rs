//! SDK Utilities
//!
//! Common utilities for the SDK.

mod hashing;
mod time;
mod validation;

pub use hashing::{content_hash, normalize_text, normalized_hash};
pub use time::{now_millis, truncate_to_millis};
pub use validation::{
    validate_embedding, validate_item_id, validate_metadata, ValidationError, MAX_ID_LEN, MAX_METADATA_KEY_LEN,
};
