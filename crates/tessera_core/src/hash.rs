//! SHA-256 fingerprints of canonical encodings.

use sha2::{Digest, Sha256};

/// A SHA-256 hash (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Length of the hex rendering
    pub const HEX_LEN: usize = 64;

    /// Compute SHA-256 hash of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Convert to lowercase hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
