use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConnectionState;

/// Broad error category used for user-facing handling and logging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Authentication failure (rejected token, unusable claims).
    Auth,
    /// Transport-level failure (connect refused, abrupt close).
    Transport,
    /// Wire protocol failure (malformed frame, unknown type).
    Protocol,
    /// Invalid input or configuration issue.
    Config,
    /// Internal client bug or invariant break.
    Internal,
}

/// Stable client error payload emitted across the command/event boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ClientError {
    /// High-level error category.
    pub category: ErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Construct a new client error.
    pub fn new(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-state-transition error.
    pub fn invalid_state(current: ConnectionState, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            ErrorCategory::Internal,
            "invalid_state_transition",
            format!("cannot run '{action}' while connection is in state {current:?}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_invalid_state_error_code_stable() {
        let err = ClientError::invalid_state(ConnectionState::Disconnected, "transport_open");
        assert_eq!(err.code, "invalid_state_transition");
        assert_eq!(err.category, ErrorCategory::Internal);
        assert!(err.message.contains("transport_open"));
        assert!(err.message.contains("Disconnected"));
    }
}
