//! Error types for the workflow engine

use thiserror::Error;

/// Errors raised by graph mutation, execution and persistence
#[derive(Debug, Error)]
pub enum EngineError {
    /// Edge or node integrity violation, rejected before mutation
    #[error("invalid reference: {message}")]
    InvalidReference { message: String },

    /// Workflow cannot start
    #[error("workflow '{workflow}' has no entry point (a trigger node with no incoming edges)")]
    NoEntryPoint { workflow: String },

    /// Stored version moved on since this copy was loaded
    #[error("sync conflict on workflow '{id}': expected version {expected}, stored version is {actual}")]
    SyncConflict {
        id: String,
        expected: u64,
        actual: u64,
    },

    /// The state machine does not allow this status change
    #[error("illegal transition for node '{node}': {message}")]
    IllegalTransition { node: String, message: String },

    #[error("workflow '{id}' not found")]
    NotFound { id: String },

    /// Another controller holds this workflow
    #[error("workflow '{id}' is already held by another execution controller")]
    ControllerBusy { id: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Self::InvalidReference {
            message: message.into(),
        }
    }

    pub fn illegal_transition(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IllegalTransition {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Returns true if the operation was rejected before touching any state
    pub fn is_structural(&self) -> bool {
        !matches!(self, EngineError::Storage(_) | EngineError::Document(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_structural() {
        assert!(EngineError::invalid_reference("missing node").is_structural());
        assert!(
            EngineError::NoEntryPoint {
                workflow: "wf".into()
            }
            .is_structural()
        );
        assert!(
            !EngineError::Storage(rusqlite::Error::InvalidQuery).is_structural()
        );
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::SyncConflict {
            id: "wf-1".into(),
            expected: 2,
            actual: 3,
        };
        let display = err.to_string();
        assert!(display.contains("wf-1"));
        assert!(display.contains("expected version 2"));
        assert!(display.contains("3"));

        let err = EngineError::illegal_transition("inspect", "decision nodes need a branch");
        assert!(err.to_string().contains("inspect"));
    }
}
