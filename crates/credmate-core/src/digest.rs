//! # Content-Addressed Digests
//!
//! Defines [`ContentDigest`] and [`DigestAlgorithm`]. Digests carry an
//! algorithm tag so a future hash migration does not invalidate stored
//! snapshot identifiers.
//!
//! ## Security Invariant
//!
//! [`sha256_digest`] only accepts [`CanonicalBytes`], so every digest in the
//! engine was produced from canonicalized data.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;

/// The hash algorithm used to compute a content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    /// SHA-256.
    Sha256,
}

impl DigestAlgorithm {
    /// The lowercase algorithm name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// A content digest with its algorithm tag.
///
/// Serializes as `"sha256:<hex>"` so snapshot identifiers read naturally
/// in API responses and log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    /// The hash algorithm that produced this digest.
    pub algorithm: DigestAlgorithm,
    /// The raw 32-byte digest value.
    pub bytes: [u8; 32],
}

impl ContentDigest {
    /// Create a SHA-256 content digest from raw bytes.
    pub fn sha256(bytes: [u8; 32]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            bytes,
        }
    }

    /// Return the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse the `"sha256:<hex>"` form.
    pub fn parse(value: &str) -> Option<Self> {
        let hex = value.strip_prefix("sha256:")?;
        if hex.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self::sha256(bytes))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.to_hex())
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid content digest: {s}")))
    }
}

/// Compute the SHA-256 digest of canonical bytes.
pub fn sha256_digest(canonical: &CanonicalBytes) -> ContentDigest {
    let hash = Sha256::digest(canonical.as_bytes());
    ContentDigest::sha256(hash.into())
}

/// SHA-256 of arbitrary bytes as lowercase hex. Used for hash-chain links,
/// where the input is a concatenation of already-canonical digests.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_of_empty_object_is_stable() {
        let canonical = CanonicalBytes::new(&json!({})).unwrap();
        let digest = sha256_digest(&canonical);
        assert_eq!(
            digest.to_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn key_order_does_not_change_digest() {
        let a = sha256_digest(&CanonicalBytes::new(&json!({"a": 1, "b": 2})).unwrap());
        let b = sha256_digest(&CanonicalBytes::new(&json!({"b": 2, "a": 1})).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn display_parse_roundtrip() {
        let digest = sha256_digest(&CanonicalBytes::new(&json!("x")).unwrap());
        let text = digest.to_string();
        assert!(text.starts_with("sha256:"));
        assert_eq!(ContentDigest::parse(&text), Some(digest));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ContentDigest::parse("md5:abcd").is_none());
        assert!(ContentDigest::parse("sha256:zz").is_none());
    }

    #[test]
    fn sha256_hex_of_abc() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
