//! # Content Digests
//!
//! Defines [`ContentDigest`], the SHA-256 identity used for cached trust
//! roots, OCI blobs, and target tags, and [`DigestAlgorithm`], the set of
//! hash algorithms the mirror can check TUF-declared hashes against.
//!
//! ## Wire Form
//!
//! A digest serializes as the OCI string form `sha256:<64 lowercase hex>`.
//! [`ContentDigest::to_hex`] yields the bare hex used in cache paths and
//! target tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512};

/// Hash algorithms the mirror can compute, named as they appear in TUF
/// `hashes` maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-256, the content-addressing algorithm.
    Sha256,
    /// SHA-512, accepted when a repository declares it alongside sha256.
    Sha512,
}

impl DigestAlgorithm {
    /// Every supported algorithm, in preference order.
    pub const ALL: [DigestAlgorithm; 2] = [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512];

    /// The key used for this algorithm in TUF metadata.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Hash `data` and return the lowercase hex digest.
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => to_hex(&Sha256::digest(data)),
            Self::Sha512 => to_hex(&Sha512::digest(data)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A SHA-256 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest {
    bytes: [u8; 32],
}

impl ContentDigest {
    /// Wrap a raw 32-byte SHA-256 value.
    pub fn sha256(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse a bare 64-character hex digest.
    pub fn from_hex(hex: &str) -> Result<Self, DigestParseError> {
        if hex.len() != 64 {
            return Err(DigestParseError(format!(
                "digest must be 64 hex chars, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let hi = hex_value(chunk[0])?;
            let lo = hex_value(chunk[1])?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self { bytes })
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Return the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        to_hex(&self.bytes)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("sha256:")
            .ok_or_else(|| DigestParseError(format!("unsupported digest algorithm in {s:?}")))?;
        Self::from_hex(hex)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A digest string that is not `sha256:<64 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest: {0}")]
pub struct DigestParseError(String);

/// Compute the SHA-256 digest of raw bytes.
pub fn sha256_digest(data: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ContentDigest::sha256(bytes)
}

/// Compute the lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    sha256_digest(data).to_hex()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_value(c: u8) -> Result<u8, DigestParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        _ => Err(DigestParseError(format!(
            "non-hex character {:?} in digest",
            c as char
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    }

    #[test]
    fn display_uses_oci_form() {
        let d = sha256_digest(b"");
        assert_eq!(d.to_string(), format!("sha256:{EMPTY_SHA256}"));
    }

    #[test]
    fn parse_accepts_display_output() {
        let d = sha256_digest(b"root");
        let parsed: ContentDigest = d.to_string().parse().unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn parse_rejects_other_algorithms_and_bad_hex() {
        assert!("sha512:abcd".parse::<ContentDigest>().is_err());
        assert!(ContentDigest::from_hex("abc").is_err());
        let upper = EMPTY_SHA256.to_uppercase();
        assert!(ContentDigest::from_hex(&upper).is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let d = sha256_digest(b"layer");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{d}\""));
        let back: ContentDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn sha512_is_128_hex_chars() {
        let hex = DigestAlgorithm::Sha512.hex_digest(b"target");
        assert_eq!(hex.len(), 128);
        assert_eq!(DigestAlgorithm::Sha512.name(), "sha512");
    }
}
