//! Standard (padded) base64 and the fixed-shape key pass built on it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::types::{ROUNDS, SHAPED_KEY_MAX_LEN};

/// Base64 encode bytes with the standard alphabet and padding.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Base64 decode a standard, padded string.
pub fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(s)
}

/// Apply the 7-round shaping pass: base64 encode, then keep at most the first
/// 32 characters, seven times over.
///
/// The result is printable ASCII of at most 32 characters. This only fixes
/// the shape of a key string; it adds no entropy.
pub fn shape_key(seed: &[u8]) -> String {
    let mut key = base64_encode(seed);
    key.truncate(SHAPED_KEY_MAX_LEN);
    for _ in 1..ROUNDS {
        key = base64_encode(key.as_bytes());
        key.truncate(SHAPED_KEY_MAX_LEN);
    }
    key
}
