//! Content digests for archive files.
//!
//! A [`FileHash`] is raw digest bytes tagged with the algorithm that produced
//! them. The bytes are not printable; hex is the only textual form, and the
//! canonical rendering is `<algorithm>:<hex>` (e.g. `md5:9e107d9d...`).

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::HashError;

/// Digest algorithms understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Every supported algorithm, in the order config keys are probed.
    pub fn all() -> &'static [HashAlgorithm] {
        &[HashAlgorithm::Md5, HashAlgorithm::Sha256]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Length in bytes of a digest produced by this algorithm.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha256 => 32,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            _ => Err(HashError::UnknownAlgorithm(s.to_owned())),
        }
    }
}

/// A digest value. Equal only when both algorithm and bytes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHash {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl FileHash {
    pub fn new(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Digest an in-memory buffer.
    pub fn of_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let bytes = match algorithm {
            HashAlgorithm::Md5 => Md5::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        };
        Self { algorithm, bytes }
    }

    /// Decode a hex digest. Accepts either case.
    pub fn from_hex(algorithm: HashAlgorithm, value: &str) -> Result<Self, HashError> {
        let trimmed = value.trim();
        let bytes = hex::decode(trimmed).map_err(|e| HashError::InvalidHex {
            value: trimmed.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self { algorithm, bytes })
    }

    /// Lowercase hex rendering of the digest bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for FileHash {
    type Err = HashError;

    /// Parse `<algorithm>:<hex>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, value) = s
            .split_once(':')
            .ok_or_else(|| HashError::MissingSeparator(s.trim().to_owned()))?;
        FileHash::from_hex(algorithm.trim().parse()?, value)
    }
}
