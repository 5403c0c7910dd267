//! Error handling for the ledger
//!
//! This module provides the error type shared by the engine, the store
//! backends, the gossip layer and the CLI.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// The key-value store could not be read or written
    StoreUnavailable(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Gossip communication errors
    Network(String),
    /// Transaction rejected at submission
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// A candidate chain failed linkage, content hash or proof-of-work checks
    InvalidChain { index: usize, reason: String },
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::StoreUnavailable(msg) => write!(f, "Store unavailable: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidChain { index, reason } => {
                write!(f, "Invalid chain at block {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::StoreUnavailable(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
