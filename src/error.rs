//! Error types for a3s-session

use thiserror::Error;

/// Errors that can occur in the session engine
#[derive(Debug, Error)]
pub enum SessionError {
    /// A state-machine transition was attempted from the wrong source state
    ///
    /// This indicates a bug in the caller. It is never retryable.
    #[error("Invalid transition for command '{id}': cannot {action} from {from}")]
    InvalidTransition {
        id: String,
        from: String,
        action: String,
    },

    /// The agent tried to submit a second gated action while one is outstanding
    #[error("Agent already paused at tool call '{held_by}', rejected submit for '{tool_call_id}'")]
    AlreadyPaused {
        held_by: String,
        tool_call_id: String,
    },

    /// Session or command id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A pending command was invalidated by a conversation reset
    #[error("Pending command '{0}' invalidated by session reset")]
    SessionReset(String),

    /// Durable store read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SessionError {
    pub(crate) fn invalid_transition(
        id: impl Into<String>,
        from: impl std::fmt::Display,
        action: &str,
    ) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from: from.to_string(),
            action: action.to_string(),
        }
    }

    /// Whether the caller may retry the same operation later
    ///
    /// Only `AlreadyPaused` clears up on its own (once the outstanding
    /// command resolves).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AlreadyPaused { .. })
    }
}

/// Result type alias for session engine operations
pub type Result<T> = std::result::Result<T, SessionError>;
