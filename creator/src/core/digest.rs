//! Content hashing for cache keys and scratch file names.

use sha2::{Digest, Sha256};

/// Full hex SHA-256 of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Short hash of content (first 8 bytes, 16 hex chars).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_short_and_stable() {
        let first = content_hash("print('hi')");
        assert_eq!(first, content_hash("print('hi')"));
        assert_eq!(first.len(), 16);
        assert_ne!(first, content_hash("print('bye')"));
    }

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
