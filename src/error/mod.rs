//! Error handling for the ledger node
//!
//! Expected negative outcomes (insufficient balance, duplicate transaction,
//! invalid block) are plain boolean/Option results at the call site; only
//! hard faults travel through this type.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error types for node operations
#[derive(Debug, Clone)]
pub enum NodeError {
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Transaction construction/validation errors
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Insufficient funds for transaction
    InsufficientFunds { required: f64, available: f64 },
    /// Block validation errors
    InvalidBlock(String),
    /// Mining errors
    Mining(String),
    /// A fetched replacement chain was rejected
    ChainReplacement(String),
    /// Persisted state errors (corrupt or unreadable state file)
    Persistence(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            NodeError::Network(msg) => write!(f, "Network error: {msg}"),
            NodeError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            NodeError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            NodeError::Config(msg) => write!(f, "Configuration error: {msg}"),
            NodeError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
            NodeError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            NodeError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            NodeError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            NodeError::Mining(msg) => write!(f, "Mining error: {msg}"),
            NodeError::ChainReplacement(msg) => write!(f, "Chain replacement rejected: {msg}"),
            NodeError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}
