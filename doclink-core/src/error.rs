//! Error types and result types for client operations.
//!
//! Every fallible operation in the crate returns [`ClientResult<T>`]. Errors raised by the
//! expression builders and option validation are reported before any network interaction;
//! errors reported by the server are mapped from the reply's `code` field.

use std::fmt;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::result::BulkWriteError;

/// Server error code reported when a unique index (including `_id`) is violated.
pub const DUPLICATE_KEY_CODE: i32 = 11000;
/// Server error code reported when a document fails collection validation.
pub const VALIDATION_FAILED_CODE: i32 = 121;

/// Represents all possible errors surfaced by the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// No session could be established with the server after exhausting the connect retries,
    /// or the connection manager has been shut down.
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),
    /// Waiting for pool capacity exceeded the acquire timeout.
    #[error("Connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },
    /// A structurally invalid argument was supplied (bad field path, empty batch, no-op update).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A logical combinator (`and` / `or`) was built without any children.
    #[error("Invalid argument: `{0}` requires at least one child expression")]
    EmptyCombinator(&'static str),
    /// A projection mixes included and excluded fields.
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),
    /// The client configuration failed validation or could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// The write violated a unique key constraint.
    #[error("Duplicate key: {message}")]
    DuplicateKey {
        /// The message reported by the server.
        message: String,
    },
    /// The document was rejected by the collection validator.
    #[error("Document failed validation: {message}")]
    ValidationError {
        /// The message reported by the server.
        message: String,
    },
    /// Any other error reported by the server.
    #[error("Backend error {code}: {message}")]
    BackendError {
        /// The numeric server error code.
        code: i32,
        /// The message reported by the server.
        message: String,
    },
    /// A pull was attempted on a cursor that has been closed.
    #[error("Cursor is closed")]
    CursorClosed,
    /// The operation was cancelled by its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,
    /// One or more documents of a bulk insert failed.
    #[error(transparent)]
    BulkWrite(#[from] BulkWriteError),
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A fieldless discriminant of [`ClientError`], used for matching and for log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionUnavailable,
    PoolExhausted,
    InvalidArgument,
    DuplicateKey,
    ValidationError,
    BackendError,
    CursorClosed,
    Cancelled,
    BulkWrite,
    Serialization,
}

impl ErrorKind {
    /// A stable snake-case name for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionUnavailable => "connection_unavailable",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::DuplicateKey => "duplicate_key",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::BackendError => "backend_error",
            ErrorKind::CursorClosed => "cursor_closed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::BulkWrite => "bulk_write",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    /// Returns the kind of this error.
    ///
    /// Builder-level failures (`EmptyCombinator`, `InvalidProjection`, `InvalidConfig`) all
    /// belong to [`ErrorKind::InvalidArgument`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::ConnectionUnavailable(_) => ErrorKind::ConnectionUnavailable,
            ClientError::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            ClientError::InvalidArgument(_)
            | ClientError::EmptyCombinator(_)
            | ClientError::InvalidProjection(_)
            | ClientError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            ClientError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            ClientError::ValidationError { .. } => ErrorKind::ValidationError,
            ClientError::BackendError { .. } => ErrorKind::BackendError,
            ClientError::CursorClosed => ErrorKind::CursorClosed,
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::BulkWrite(_) => ErrorKind::BulkWrite,
            ClientError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Maps a server error code and message to the matching error variant.
    pub fn from_server(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            DUPLICATE_KEY_CODE => ClientError::DuplicateKey { message },
            VALIDATION_FAILED_CODE => ClientError::ValidationError { message },
            _ => ClientError::BackendError { code, message },
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ClientError::InvalidArgument(message.into())
    }
}

/// A specialized `Result` type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

impl From<BsonError> for ClientError {
    fn from(err: BsonError) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ClientError {
    fn from(err: SerdeJsonError) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
