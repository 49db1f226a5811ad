//! Error types for the sync core

use std::fmt;
use thiserror::Error;

/// Why a request/response call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never got a usable answer (connect, timeout, decode)
    Network,
    /// The server answered with a non-success status
    Rejected { status: u16 },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::Rejected { status } => write!(f, "rejected {}", status),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid send: {0}")]
    InvalidSend(String),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Request failed ({kind}): {message}")]
    RequestFailed { kind: FailureKind, message: String },

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn network(message: impl Into<String>) -> Self {
        SyncError::RequestFailed {
            kind: FailureKind::Network,
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        SyncError::RequestFailed {
            kind: FailureKind::Rejected { status },
            message: message.into(),
        }
    }

    /// Whether the failure happened on a request/response call
    pub fn is_request_failure(&self) -> bool {
        matches!(self, SyncError::RequestFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
