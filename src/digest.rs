//! Content digests
//!
//! This module provides the validated [`Digest`] identifier used for every
//! content-addressed lookup, along with helpers for computing SHA256 digests
//! over whole buffers or incrementally via [`Digester`].

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Algorithm prefix used for every digest this crate computes
pub const SHA256: &str = "sha256";

/// Content digest of the form `algorithm:encoded`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse and validate a digest string
    pub fn parse(value: &str) -> Result<Self> {
        let (algorithm, encoded) = value
            .split_once(':')
            .ok_or_else(|| RegistryError::InvalidDigest(format!("missing algorithm in {:?}", value)))?;

        if !is_valid_algorithm(algorithm) {
            return Err(RegistryError::InvalidDigest(format!(
                "unsupported algorithm {:?} in {:?}",
                algorithm, value
            )));
        }

        let expected_len = match algorithm {
            SHA256 => Some(64),
            "sha512" => Some(128),
            _ => None,
        };

        match expected_len {
            Some(len) => {
                if encoded.len() != len || !is_lower_hex(encoded) {
                    return Err(RegistryError::InvalidDigest(format!(
                        "expected {} lowercase hex characters for {}, got {:?}",
                        len, algorithm, encoded
                    )));
                }
            }
            None => {
                if encoded.is_empty()
                    || !encoded
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '=' | '_' | '-'))
                {
                    return Err(RegistryError::InvalidDigest(format!(
                        "invalid encoded portion {:?}",
                        encoded
                    )));
                }
            }
        }

        Ok(Digest(value.to_string()))
    }

    /// Compute the SHA256 digest of a byte buffer
    pub fn sha256_of(data: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.update(data);
        digester.finalize()
    }

    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(a, _)| a).unwrap_or_default()
    }

    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map(|(_, e)| e).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_algorithm(algorithm: &str) -> bool {
    !algorithm.is_empty()
        && algorithm
            .split(['+', '.', '_', '-'])
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

fn is_lower_hex(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl PartialEq<str> for Digest {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Digest {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Incremental SHA256 digest computation
#[derive(Clone, Default)]
pub struct Digester {
    hasher: Sha256,
}

impl fmt::Debug for Digester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digester").finish_non_exhaustive()
    }
}

impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Digest of everything fed so far, leaving the digester usable
    pub fn digest(&self) -> Digest {
        self.clone().finalize()
    }

    pub fn finalize(self) -> Digest {
        Digest(format!("{}:{}", SHA256, hex::encode(self.hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_of() {
        assert_eq!(Digest::sha256_of(b"hello world").as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_empty_digest() {
        assert_eq!(
            Digest::sha256_of(b"").as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_incremental_matches_whole() {
        let mut digester = Digester::new();
        digester.update(b"hello ");
        assert_ne!(digester.digest().as_str(), HELLO_WORLD);
        digester.update(b"world");
        assert_eq!(digester.finalize().as_str(), HELLO_WORLD);
    }

    #[test]
    fn test_parse_valid() {
        let digest = Digest::parse(HELLO_WORLD).unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.encoded().len(), 64);
    }

    #[test]
    fn test_parse_invalid() {
        for value in [
            "",
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            "sha256:invalid",
            "sha256:B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9",
            "SHA256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
            "sha256:",
            "digest",
        ] {
            assert!(Digest::parse(value).is_err(), "{:?} should be rejected", value);
        }
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let json = format!("\"{}\"", HELLO_WORLD);
        let digest: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&digest).unwrap(), json);
        assert!(serde_json::from_str::<Digest>("\"sha256:nope\"").is_err());
    }
}
