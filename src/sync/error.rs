//! Snapshot read errors

use crate::error::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection failed or timed out
    #[error("network error: {message}")]
    Network { message: String },

    /// Server answered with a non-success status
    #[error("snapshot read returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response was not a snapshot
    #[error("failed to decode snapshot: {message}")]
    Decode { message: String },

    /// Poll interval of zero
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    /// In-process read failed
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SyncError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns true if the next poll tick is likely to succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { .. } => true,
            SyncError::Status { status, .. } => *status == 429 || *status >= 500,
            SyncError::Decode { .. } | SyncError::ZeroInterval => false,
            SyncError::Engine(e) => !e.is_structural(),
        }
    }
}
