//! Content Digest Handling
//!
//! A digest is a `sha256:<64 lowercase hex>` content identifier. Equality
//! is byte equality of the lowercase hex form; anything carrying a digest
//! is immutable in its content.

use crate::image::{ImageError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

const ALGORITHM_PREFIX: &str = "sha256:";
const HEX_LENGTH: usize = 64;

/// Validated content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Digest of the given content
    pub fn from_bytes(data: &[u8]) -> Self {
        Digest(format!("sha256:{:x}", Sha256::digest(data)))
    }

    /// Parse and validate an `algo:hex` string. Only sha256 is accepted,
    /// and the hex must already be lowercase.
    pub fn parse(s: &str) -> Result<Self> {
        let hex = s.strip_prefix(ALGORITHM_PREFIX).ok_or_else(|| {
            ImageError::InvalidDigest(format!("unsupported algorithm in '{}'", s))
        })?;

        if hex.len() != HEX_LENGTH {
            return Err(ImageError::InvalidDigest(format!(
                "expected {} hex characters, got {} in '{}'",
                HEX_LENGTH,
                hex.len(),
                s
            )));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(ImageError::InvalidDigest(format!(
                "non-lowercase-hex characters in '{}'",
                s
            )));
        }

        Ok(Digest(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex portion without the algorithm prefix
    pub fn hex(&self) -> &str {
        &self.0[ALGORITHM_PREFIX.len()..]
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Digest {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_known_vector() {
        // sha256 of the empty input
        let d = Digest::from_bytes(b"");
        assert_eq!(
            d.as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let d = Digest::from_bytes(b"content");
        let parsed = Digest::parse(d.as_str()).unwrap();
        assert_eq!(d, parsed);
        assert_eq!(parsed.hex().len(), 64);
    }

    #[test]
    fn test_parse_rejects_bad_algorithm() {
        let err = Digest::parse("sha512:0000").unwrap_err();
        assert!(err.to_string().contains("unsupported algorithm"));
    }

    #[test]
    fn test_parse_rejects_short_hex() {
        assert!(Digest::parse("sha256:abc123").is_err());
    }

    #[test]
    fn test_parse_rejects_uppercase_hex() {
        let upper = format!("sha256:{}", "A".repeat(64));
        assert!(Digest::parse(&upper).is_err());
    }
}
