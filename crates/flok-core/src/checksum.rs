//! SHA-256 signatures for tamper detection.

use sha2::{Digest, Sha256};

/// Compute the hex SHA-256 digest of a byte slice
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    format!("{:x}", result)
}
