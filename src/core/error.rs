//! Error types for idchain.

use crate::core::types::{IdentityId, NodeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for idchain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in idchain operations.
///
/// Errors are plain data so a node can hand them back over the transport
/// exactly as the store raised them.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    // Protocol errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Identity already exists: {0}")]
    AlreadyExists(IdentityId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Partial failure: {} succeeded, {} failed", .succeeded.len(), .failed.len())]
    PartialFailure {
        /// Nodes that accepted the request
        succeeded: Vec<NodeId>,
        /// Nodes that rejected it, with the reason
        failed: Vec<(NodeId, Error)>,
    },

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    // Cryptography errors
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    // Transport errors
    #[error("Node unreachable: {0}")]
    NodeUnreachable(NodeId),

    #[error("Timed out waiting for node {0}")]
    Timeout(NodeId),

    #[error("Unexpected response from node {0}")]
    UnexpectedResponse(NodeId),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Unauthorized,
    InvalidProof,
    PartialFailure,
    LedgerUnavailable,
    Transport,
    Other,
}

impl Error {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::InvalidProof(_) => ErrorKind::InvalidProof,
            Error::PartialFailure { .. } => ErrorKind::PartialFailure,
            Error::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            Error::NodeUnreachable(_) | Error::Timeout(_) | Error::UnexpectedResponse(_) => {
                ErrorKind::Transport
            }
            _ => ErrorKind::Other,
        }
    }

    /// Whether retrying the same call later can succeed without the caller
    /// refreshing its view first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::LedgerUnavailable(_)
                | Error::NodeUnreachable(_)
                | Error::Timeout(_)
                | Error::PartialFailure { .. }
        )
    }

    /// Nodes that failed in a fan-out, empty for any other error.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        match self {
            Error::PartialFailure { failed, .. } => {
                failed.iter().map(|(node, _)| node.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        Error::InvalidProof(err.to_string())
    }
}
