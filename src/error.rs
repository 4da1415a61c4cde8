//! Error types for VaultChain

use std::fmt;
use thiserror::Error;

/// Failures raised by [`crate::crypto::CryptoService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid base64 in {0}")]
    InvalidBase64(&'static str),

    #[error("{what} must be {expected} bytes, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: String,
        got: usize,
    },

    /// Plaintext does not fit in a single OAEP block for the current key.
    #[error("payload of {len} bytes exceeds the asymmetric limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    /// PKCS#7 check failed: corrupted ciphertext or the wrong key/IV.
    #[error("padding check failed")]
    Padding,

    #[error("rsa failure: {0}")]
    Rsa(String),

    #[error("signing failure: {0}")]
    Signing(String),

    #[error("decrypted bytes are not valid UTF-8")]
    InvalidUtf8,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// A record could not be sealed; nothing was appended.
    Sealing(CryptoError),
    Crypto(CryptoError),
    EmptyRecord,
    InvalidBlock(String),
    InvalidConfig(String),
    MiningCancelled,
    MiningDeadlineExceeded,
    NonceExhausted,
    BlockNotFound(u64),
    NotSealed(u64),
    IoError(String),
    SerializationError(String),
    WorkerError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::Sealing(err) => write!(f, "Sealing failed: {}", err),
            ChainError::Crypto(err) => write!(f, "Cryptographic error: {}", err),
            ChainError::EmptyRecord => write!(f, "Record is empty"),
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            ChainError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            ChainError::MiningCancelled => write!(f, "Mining cancelled"),
            ChainError::MiningDeadlineExceeded => write!(f, "Mining deadline exceeded"),
            ChainError::NonceExhausted => write!(f, "Nonce space exhausted"),
            ChainError::BlockNotFound(index) => write!(f, "Block {} not found", index),
            ChainError::NotSealed(index) => write!(f, "Block {} carries no sealed payload", index),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            ChainError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChainError::Sealing(err) | ChainError::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CryptoError> for ChainError {
    fn from(err: CryptoError) -> Self {
        ChainError::Crypto(err)
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
