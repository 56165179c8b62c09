//! Error types for the txwatch indexer.
//!
//! Errors raised at the blockchain reader boundary are transient by nature:
//! the engine logs them and moves on. Everything else is either a local
//! invariant failure or a configuration problem.

use thiserror::Error;

/// Result type alias for txwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the txwatch indexer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Reader Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Transport-level failure talking to the chain node
    #[error("RPC transport error: {0}")]
    Rpc(String),

    /// The node answered with a JSON-RPC error object
    #[error("RPC error response [{code}]: {message}")]
    RpcResponse {
        /// JSON-RPC error code
        code: i64,
        /// Error message reported by the node
        message: String,
    },

    /// The node answered with something we could not decode
    #[error("Decode error: {0}")]
    Decode(String),

    // ═══════════════════════════════════════════════════════════════════
    // Projection Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Block number does not fit the wire representation
    #[error("Block number {0} exceeds the signed 64-bit wire range")]
    BlockNumberOverflow(String),

    // ═══════════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// The engine could not reach a serviceable state
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Lock acquisition failed
    #[error("Lock acquisition failed")]
    Lock,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true for reader failures that a later attempt may not hit
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_) | Error::RpcResponse { .. } | Error::Decode(_)
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Reader errors: 1xxx
            Error::Rpc(_) => 1001,
            Error::RpcResponse { .. } => 1002,
            Error::Decode(_) => 1003,

            // Projection errors: 2xxx
            Error::BlockNumberOverflow(_) => 2001,

            // Configuration errors: 3xxx
            Error::InvalidConfig { .. } => 3001,

            // Internal errors: 9xxx
            Error::Initialization(_) => 9001,
            Error::Lock => 9002,
            Error::Internal(_) => 9003,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Rpc(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
