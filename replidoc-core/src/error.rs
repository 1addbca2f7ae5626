//! Error types and result types for client operations.
//!
//! This module provides the error taxonomy for every fallible operation in the
//! client. Use [`ClientResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a replica set
/// through this client.
///
/// This enum covers configuration faults, connection lifecycle failures, read
/// routing failures, and expression construction/compilation errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Invalid or unrecognized configuration, detected at construction time.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Establishing a connection did not complete within the connect timeout.
    #[error("Connect timeout contacting {0}")]
    ConnectTimeout(String),
    /// The credential handshake was rejected by the node. Never retried: this
    /// is a configuration error, not a transient fault.
    #[error("Authentication failed against {0}")]
    AuthenticationFailed(String),
    /// The pool is at capacity and no handle was released within the connect
    /// timeout.
    #[error("Connection pool exhausted for {0}")]
    PoolExhausted(String),
    /// The pool has been closed; no further connections can be acquired.
    #[error("Connection pool is closed")]
    PoolClosed,
    /// A read requiring the primary found no node known to be primary.
    #[error("No primary available in the replica set")]
    NoPrimaryAvailable,
    /// No reachable node satisfies the requested read preference.
    #[error("No reachable node satisfies read preference {0}")]
    NoReachableNode(String),
    /// An expression node the compiler cannot express on the wire. This is a
    /// programming error in the caller, not a runtime data error.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),
    /// Two mutation operations in one update expression target the same field.
    #[error("Conflicting update operations on field {0}")]
    ConflictingUpdate(String),
    /// A mutation was applied to a field whose existing value has an
    /// incompatible type. The first argument is the field, the second
    /// describes the mismatch.
    #[error("Type mismatch on field {0}: {1}")]
    TypeMismatch(String, String),
    /// A find stream failed mid-iteration. Documents already yielded remain
    /// valid; the underlying connection is destroyed, never reused.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
    /// Serialization/deserialization error when converting documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A failure in the underlying transport (TCP-level connect errors,
    /// resets, malformed replies).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether the error is a transient network-layer fault that connection
    /// establishment may retry with backoff. Authentication, expression, and
    /// pool-capacity errors are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::ConnectTimeout(_))
    }
}

/// A specialized `Result` type for client operations.
///
/// This type alias is used throughout the crate to indicate operations that
/// may fail with a [`ClientError`].
pub type ClientResult<T> = Result<T, ClientError>;

impl From<BsonError> for ClientError {
    fn from(err: BsonError) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
