//! Error types for identity account operations

use crate::types::{KeyId, KeyType, Purpose};
use thiserror::Error;

/// Result type alias for identity account operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while operating an identity account
///
/// Every error is surfaced synchronously and leaves account state exactly as it
/// was before the failing operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ============ Authorization Errors ============
    /// Caller lacks the purpose required for the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ============ Key Registry Errors ============
    /// Key already holds the purpose being added
    #[error("Key {key} already has purpose {purpose}")]
    DuplicatePurpose { key: KeyId, purpose: Purpose },

    /// Existing key type differs from the one supplied
    #[error("Key type mismatch for {key}: registered {registered}, supplied {supplied}")]
    KeyTypeMismatch {
        key: KeyId,
        registered: KeyType,
        supplied: KeyType,
    },

    /// Key does not hold the purpose being removed
    #[error("Key {key} does not have purpose {purpose}")]
    PurposeNotFound { key: KeyId, purpose: Purpose },

    /// Removal would leave the account without a management key
    #[error("Cannot remove the last management key {0}")]
    LastManagementKey(KeyId),

    // ============ Approval Queue Errors ============
    /// Pending transaction handle is unknown
    #[error("Transaction not found: {0}")]
    TransactionNotFound(u64),

    /// Pending transaction was already executed or rejected
    #[error("Transaction {0} is already finalized")]
    AlreadyFinalized(u64),

    // ============ Signed Relay Errors ============
    /// Signed message is not addressed from this account
    #[error("Invalid sender: {0}")]
    InvalidSender(String),

    /// Operation type code is not supported
    #[error("Unsupported operation type: {0}")]
    UnsupportedOperation(u8),

    /// Supplied gas does not cover the signed gas limit
    #[error("Insufficient gas: required more than {required}, available {available}")]
    InsufficientGas { required: u64, available: u64 },

    /// Nonce is neither the next sequential value nor a fresh timestamp
    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    /// Signature is malformed, unrecoverable, unauthorized, or repeated
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Fewer valid signatures than the required threshold
    #[error("Insufficient signatures: required {required}, got {actual}")]
    InsufficientSignatures { required: usize, actual: usize },

    /// Required signature count is out of range
    #[error("Invalid signature threshold: {0}")]
    InvalidThreshold(String),

    // ============ Execution Errors ============
    /// Dispatched call failed
    #[error("Call failed: {0}")]
    CallFailed(String),

    /// Account balance cannot cover a value transfer or refund
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    // ============ Configuration Errors ============
    /// Invalid account configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build an `InsufficientFunds` error from any displayable amounts
    pub fn insufficient_funds(required: impl ToString, available: impl ToString) -> Self {
        Error::InsufficientFunds {
            required: required.to_string(),
            available: available.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Serialization(e.to_string())
    }
}
