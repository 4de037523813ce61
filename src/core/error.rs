//! Error types for the property synchronization protocol.

use thiserror::Error;

/// Errors from decoding a delimited wire token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token did not contain the expected number of fields.
    #[error("expected {expected} token fields, got {actual}")]
    FieldCount {
        /// Fields required by the token format.
        expected: usize,
        /// Fields actually present.
        actual: usize,
    },

    /// The sequence number field is not a valid unsigned integer.
    #[error("invalid sequence number field: {0:?}")]
    InvalidSequenceNumber(String),

    /// A mandatory field carried the null placeholder.
    #[error("unexpected null field: {0}")]
    NullField(&'static str),
}

/// Protocol-level errors in a received property update.
///
/// Any of these aborts processing of the single offending message only; the
/// failure is surfaced to the messaging layer as the request's error result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message body was empty.
    #[error("empty update body")]
    EmptyBody,

    /// The update subtype token is not part of the protocol.
    #[error("invalid update subtype: {0:?}")]
    UnknownSubtype(String),

    /// A property token inside the update failed to decode.
    #[error("malformed property token: {0}")]
    Token(#[from] TokenError),
}

/// Errors reported by the transport layer for a single link operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The link is gone or the remote node cannot be reached.
    #[error("link closed")]
    Closed,

    /// The remote side returned a failure response.
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Top-level errors of the property synchronization subsystem.
///
/// No variant is fatal to the process; every failure is scoped to one message
/// or one neighbor link.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Protocol error in a received message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport failure on a neighbor link.
    #[error("link error: {0}")]
    Link(#[from] LinkError),
}
