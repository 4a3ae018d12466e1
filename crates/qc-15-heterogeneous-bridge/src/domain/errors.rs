//! # Domain Errors
//!
//! Error types for the heterogeneous bridge.
//!
//! Decoding failures never leave the parser: they are logged and turned into
//! an absent result. Everything that reaches a caller is either retryable
//! (upstream, timeout, storage) or a hard misconfiguration.

use super::value_objects::ExternalChainId;
use thiserror::Error;

/// Bridge error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Event or calldata present but fields missing or inconsistent.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// External chain RPC failed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// External chain fetch exceeded the caller-supplied bound.
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Configured bound in milliseconds
        timeout_ms: u64,
    },

    /// Local key-value store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record could not be encoded or decoded for persistence.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Registry lookup for a chain that was never registered.
    #[error("Unknown external chain: {0}")]
    UnknownChain(ExternalChainId),

    /// Internal state observed in a shape correct code cannot produce.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the caller may retry the same height or transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable(_)
                | Self::Timeout { .. }
                | Self::Storage(_)
                | Self::Serialization(_)
        )
    }

    /// Shorthand for malformed-data errors raised by decoders.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedData(msg.into())
    }
}

impl From<bincode::Error> for BridgeError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ethabi::Error> for BridgeError {
    fn from(e: ethabi::Error) -> Self {
        Self::MalformedData(e.to_string())
    }
}
