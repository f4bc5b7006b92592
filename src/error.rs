//! Error type shared by the signer, the transfer engine and the client

use hyper::StatusCode;
use thiserror::Error;

/// Transfer errors
///
/// Every variant carries enough context to tell which step failed. There is
/// no retry inside one attempt: the first failure becomes the result.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Missing or invalid connection parameters
    #[error("validation error: {0}")]
    Validation(String),

    /// Local file failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Dial, read or write failure on the connection
    #[error("{context}: {source}")]
    Network {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Network deadline expired where it is not recoverable
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-success status (body as message)
    #[error("S3 error: {status} - {message}")]
    Protocol { status: StatusCode, message: String },

    /// Response that could not be parsed as HTTP/1.x
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Size or checksum mismatch after a download
    #[error("integrity error: {0}")]
    Integrity(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn network(context: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::Network {
            context: context.into(),
            source,
        }
    }

    /// Response that could not be parsed at all
    pub fn malformed(message: impl Into<String>) -> Self {
        TransferError::MalformedResponse(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::Timeout(_))
    }

    /// HTTP status of a protocol failure, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransferError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}
