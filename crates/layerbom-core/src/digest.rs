//! Content-address digests
//!
//! A digest is an algorithm tag plus the raw checksum bytes. The canonical
//! string form is `algo:hex` and is what the store persists and the wire
//! schema carries. Comparison is bytewise.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Checksum length in bytes.
    pub fn checksum_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }
}

/// Errors constructing or parsing a digest.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("digest is missing the algorithm separator")]
    MissingSeparator,
    #[error("bad checksum for {algorithm}: expected {expected} bytes, got {got}")]
    BadLength {
        algorithm: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("checksum is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

/// A content address: algorithm tag + checksum.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    checksum: Vec<u8>,
}

impl Digest {
    /// Construct from an algorithm and raw checksum bytes, validating the
    /// checksum length.
    pub fn new(algorithm: DigestAlgorithm, checksum: Vec<u8>) -> Result<Self, DigestError> {
        if checksum.len() != algorithm.checksum_len() {
            return Err(DigestError::BadLength {
                algorithm: algorithm.as_str(),
                expected: algorithm.checksum_len(),
                got: checksum.len(),
            });
        }
        Ok(Digest {
            algorithm,
            checksum,
        })
    }

    /// SHA-256 of the given bytes.
    pub fn sha256_of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest {
            algorithm: DigestAlgorithm::Sha256,
            checksum: hasher.finalize().to_vec(),
        }
    }

    /// SHA-512 of the given bytes.
    pub fn sha512_of(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        Digest {
            algorithm: DigestAlgorithm::Sha512,
            checksum: hasher.finalize().to_vec(),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn checksum(&self) -> &[u8] {
        &self.checksum
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), hex::encode(&self.checksum))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algo, hexsum) = s.split_once(':').ok_or(DigestError::MissingSeparator)?;
        let algorithm = match algo {
            "sha256" => DigestAlgorithm::Sha256,
            "sha512" => DigestAlgorithm::Sha512,
            other => return Err(DigestError::UnknownAlgorithm(other.to_string())),
        };
        let checksum = hex::decode(hexsum)?;
        Digest::new(algorithm, checksum)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
