//! Error types for the session engine
//!
//! Every public operation returns [`Result`]; transport and protocol failures
//! are wrapped before they reach the caller.

use crate::message_parser::DecodeError;
use agentwire_protocol::ProtocolError;
use agentwire_transport::TransportError;
use std::time::Duration;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur in agent operations
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent process could not be started
    #[error("failed to launch agent process: {0}")]
    Launch(String),

    /// The transport was used before start or after close
    #[error("agent process is not connected")]
    NotConnected,

    /// A frame could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A hook callback failed
    #[error("hook failed: {0}")]
    Hook(String),

    /// The operation is not valid in the session's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The turn did not finish within the configured timeout
    #[error("turn timed out after {0:?}")]
    Timeout(Duration),

    /// A cost, turn or token ceiling was reached
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Options were rejected at build time
    #[error("illegal configuration: {0}")]
    IllegalConfiguration(String),

    /// The agent process crashed or its pipes closed
    #[error("transport failure: {0}")]
    Transport(String),

    /// The control channel was violated or a control request failed
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AgentError {
    /// Whether the session was torn down by this error
    ///
    /// After a fatal error the client is closed and every further turn is
    /// rejected.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Launch(_) | Self::Transport(_))
    }

    /// Whether the error was raised before anything was sent to the agent
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidState(_) | Self::BudgetExceeded(_) | Self::IllegalConfiguration(_)
        )
    }
}

impl From<TransportError> for AgentError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Launch(msg) => Self::Launch(msg),
            TransportError::NotConnected => Self::NotConnected,
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<ProtocolError> for AgentError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
