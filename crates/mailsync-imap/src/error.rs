//! Error types for the IMAP client.

use std::time::Duration;

use thiserror::Error;

use crate::types::ResponseCode;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The server closed the connection without a BYE.
    #[error("Connection lost")]
    ConnectionLost,

    /// A response could not be tokenized or parsed.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
        /// The raw response that failed to parse, when known.
        line: Option<Vec<u8>>,
    },

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server returned a tagged NO.
    #[error("Server returned NO: {text}")]
    No {
        /// Response code attached to the completion, if any.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },

    /// Server returned a tagged BAD.
    #[error("Server returned BAD: {text}")]
    Bad {
        /// Response code attached to the completion, if any.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The command is not valid in the current session state.
    #[error("{operation} is not allowed in the {state} state")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// Name of the state the session was in.
        state: &'static str,
    },

    /// The server does not advertise the capability an operation needs.
    #[error("Server does not support {0}")]
    CapabilityMissing(String),

    /// No charset could be agreed on for a search string.
    #[error("Charset {charset} rejected by server (supported: {supported:?})")]
    BadCharset {
        /// The charset the client tried last.
        charset: String,
        /// Charsets the server reported in `[BADCHARSET]`.
        supported: Vec<String>,
    },
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection failed or timed out.
    Transport,
    /// The server sent something that violates the protocol.
    Protocol,
    /// The server rejected a command (NO/BAD) or authentication.
    Command,
    /// A required extension is not available.
    CapabilityMissing,
    /// Charset negotiation failed.
    Charset,
    /// The command was issued in the wrong session state.
    State,
}

impl Error {
    /// Creates a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
            line: None,
        }
    }

    /// Attaches the raw response to a parse error.
    #[must_use]
    pub fn with_line(self, raw: &[u8]) -> Self {
        match self {
            Self::Parse {
                position,
                message,
                line: None,
            } => Self::Parse {
                position,
                message,
                line: Some(raw.to_vec()),
            },
            other => other,
        }
    }

    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::Timeout(_)
            | Self::ConnectionLost
            | Self::Bye(_) => ErrorKind::Transport,
            Self::Parse { .. } | Self::Protocol(_) => ErrorKind::Protocol,
            Self::No { .. } | Self::Bad { .. } | Self::Auth(_) => ErrorKind::Command,
            Self::CapabilityMissing(_) => ErrorKind::CapabilityMissing,
            Self::BadCharset { .. } => ErrorKind::Charset,
            Self::InvalidState { .. } => ErrorKind::State,
        }
    }

    /// Returns true if the connection can no longer be used after this error.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }

    /// Returns the response code of a NO/BAD completion.
    #[must_use]
    pub const fn response_code(&self) -> Option<&ResponseCode> {
        match self {
            Self::No { code, .. } | Self::Bad { code, .. } => code.as_ref(),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
