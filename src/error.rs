//! Error types for the sync engine.

use crate::types::SubscriptionId;
use thiserror::Error;

/// Main error type for store, API and sync operations.
#[derive(Debug, Error)]
pub enum NtfyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connectivity failure, timeout or a non-2xx response.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed JSON line or object in a server response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Single-message fetch returned nothing.
    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Already subscribed to {topic} on {base_url}")]
    Duplicate { base_url: String, topic: String },

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    /// A message source panicked while fetching.
    #[error("Fetch worker panicked: {0}")]
    WorkerPanic(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

impl NtfyError {
    /// Whether a later scheduled attempt can be expected to succeed.
    ///
    /// Only transport failures qualify; a parse error will repeat until the
    /// server stops sending the offending line.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NtfyError::Network(_))
    }
}

impl From<serde_json::Error> for NtfyError {
    fn from(e: serde_json::Error) -> Self {
        NtfyError::Parse(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for NtfyError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        NtfyError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for NtfyError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        NtfyError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for NtfyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NtfyError::Network(format!("request timed out: {}", e))
        } else if let Some(status) = e.status() {
            NtfyError::Network(format!("server returned {}", status))
        } else {
            NtfyError::Network(e.to_string())
        }
    }
}

/// Result type for sync engine operations.
pub type Result<T> = std::result::Result<T, NtfyError>;
