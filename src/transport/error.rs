use std::io;

use thiserror::Error;

/// Failure to even start a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("invalid {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("cannot reach {address}: {reason}")]
    Unreachable { address: String, reason: String },
}

impl ConnectError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a live session's transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("{kind:?}: {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether the peer dropped the connection under us.
    pub fn is_connection_reset(&self) -> bool {
        match self {
            TransportError::ConnectionReset(_) => true,
            TransportError::Io { message, .. } | TransportError::Protocol(message) => {
                message.contains("ECONNRESET")
            }
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                TransportError::ConnectionReset(err.to_string())
            }
            kind => TransportError::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}
