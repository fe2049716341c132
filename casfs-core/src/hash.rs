//! The content hash type used by the engine (SHA-256, rendered as 64
//! lowercase hex characters). See spec §4.1 and §3.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::CasfsError;

/// A validated SHA-256 content hash: exactly 64 lowercase hex characters.
///
/// Two hashes compare equal iff their canonical (lowercase hex) forms are
/// byte-equal — since the internal representation is the raw 32-byte digest,
/// equality, ordering, and hashing all fall out of `[u8; 32]`'s own impls.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Parses a 64-character lowercase hex string into a [`ContentHash`].
    pub fn parse(s: &str) -> Result<Self, CasfsError> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(CasfsError::InvalidHash(format!(
                "expected 64 lowercase hex characters, got: {s}"
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CasfsError::InvalidHash(format!("{s}: {e}")))?;
        Ok(ContentHash(bytes))
    }

    /// Computes the SHA-256 digest of `bytes` and returns it as a [`ContentHash`].
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The first two and next two hex characters of the canonical form —
    /// the shard path components used by the reference blob store layout
    /// (spec §4.3, §6.2).
    pub fn shard_prefix(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[0..2].to_string(), hex[2..4].to_string())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentHash").field(&self.to_hex()).finish()
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }
}

impl From<ContentHash> for [u8; 32] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_known_content() {
        let hash = ContentHash::of(b"Hello World");
        assert_eq!(
            hash.to_hex(),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ContentHash::parse("abc").is_err());
    }

    #[test]
    fn rejects_uppercase() {
        let hex = ContentHash::of(b"x").to_hex().to_uppercase();
        assert!(ContentHash::parse(&hex).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(ContentHash::parse(&bad).is_err());
    }

    #[test]
    fn round_trips_through_hex() {
        let hash = ContentHash::of(b"round trip");
        let parsed = ContentHash::parse(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn shard_prefix_splits_hex() {
        let hash = ContentHash::parse(
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e",
        )
        .unwrap();
        assert_eq!(hash.shard_prefix(), ("a5".to_string(), "91".to_string()));
    }
}
