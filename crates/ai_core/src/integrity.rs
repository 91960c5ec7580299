//! Content integrity tokens for model artifacts.
//!
//! A token is `<algorithm>:<hex digest>` computed over the exact bytes of the
//! model file. A bare 64-character hex string is read as SHA-256.

use crate::errors::{CoreError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    fn digest(&self, bytes: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(bytes).into(),
            HashAlgorithm::Blake3 => *blake3::hash(bytes).as_bytes(),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(CoreError::ModelValidation(format!(
                "unsupported integrity algorithm '{other}'"
            ))),
        }
    }
}

/// Parsed integrity token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityToken {
    algorithm: HashAlgorithm,
    digest: [u8; 32],
}

impl IntegrityToken {
    /// Compute the token for `bytes`
    pub fn compute(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(bytes),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Compare against the digest of `bytes`, failing with `ModelValidation` on mismatch
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        let actual = Self::compute(self.algorithm, bytes);
        if actual.digest != self.digest {
            return Err(CoreError::ModelValidation(format!(
                "integrity token mismatch: metadata records {}, artifact hashes to {}",
                self, actual
            )));
        }
        Ok(())
    }
}

impl FromStr for IntegrityToken {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (algorithm, hex_digest) = match trimmed.split_once(':') {
            Some((alg, digest)) => (alg.parse()?, digest),
            None => (HashAlgorithm::Sha256, trimmed),
        };

        let mut digest = [0u8; 32];
        hex::decode_to_slice(hex_digest.trim(), &mut digest).map_err(|_| {
            CoreError::ModelValidation(format!(
                "integrity token '{trimmed}' is not a 32-byte hex digest"
            ))
        })?;

        Ok(Self { algorithm, digest })
    }
}

impl fmt::Display for IntegrityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), hex::encode(self.digest))
    }
}
