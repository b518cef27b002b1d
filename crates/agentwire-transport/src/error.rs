//! Transport error types

use std::fmt;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur in transport operations
#[derive(Debug)]
pub enum TransportError {
    /// The agent process could not be launched
    Launch(String),

    /// Operation requires a started transport
    NotConnected,

    /// The process closed its pipes or exited unexpectedly
    Connection(String),

    /// I/O error
    Io(std::io::Error),

    /// Timeout error
    Timeout,

    /// Serialization error
    Serialization(String),

    /// Process management error (signals, reaping)
    Process(String),
}

impl TransportError {
    /// Whether the error means the process is gone
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Connection(_) | Self::NotConnected => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch(msg) => write!(f, "Launch error: {}", msg),
            Self::NotConnected => write!(f, "Transport not connected"),
            Self::Connection(msg) => write!(f, "Connection error: {}", msg),
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Timeout => write!(f, "Timeout"),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::Process(msg) => write!(f, "Process error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::ErrorKind;

    #[rstest]
    #[case(TransportError::from(std::io::Error::from(ErrorKind::BrokenPipe)), true)]
    #[case(TransportError::from(std::io::Error::from(ErrorKind::UnexpectedEof)), true)]
    #[case(TransportError::from(std::io::Error::from(ErrorKind::PermissionDenied)), false)]
    #[case(TransportError::NotConnected, true)]
    #[case(TransportError::Connection("stdout closed".into()), true)]
    #[case(TransportError::Timeout, false)]
    #[case(TransportError::Launch("missing".into()), false)]
    fn test_is_disconnect(#[case] err: TransportError, #[case] expected: bool) {
        assert_eq!(err.is_disconnect(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TransportError::Launch("claude: not found".into()).to_string(),
            "Launch error: claude: not found"
        );
    }
}
