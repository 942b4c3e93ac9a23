//! # Error Taxonomy
//!
//! Purpose: Give every layer (codec, engine, server) one shared vocabulary
//! for the handful of ways an operation in this store can fail.
//!
//! ## Design Principles
//!
//! 1. **Typed, Not Stringly**: Each failure mode is its own variant so
//!    callers can match on it instead of parsing messages.
//! 2. **`thiserror` at the Boundary**: IO failures are wrapped with
//!    `#[from]` so `?` keeps working across socket/file operations.
//! 3. **No Panics on the Hot Path**: Anything reachable from a client
//!    request returns `Result`, never `unwrap`/`expect`.

use std::fmt;

/// Errors surfaced while decoding a frame from the wire.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame leader byte was not one of `+`, `$`, `*`.
    #[error("unknown frame leader")]
    BadLeader,
    /// A length or count field was not valid decimal ASCII.
    #[error("malformed length field")]
    BadLength,
    /// A bulk string's payload was not followed by the required CRLF.
    #[error("missing trailing CRLF")]
    BadTerminator,
    /// A bulk-string array contained something other than a bulk string.
    #[error("array element must be a bulk string")]
    BadArrayElement,
}

/// Errors surfaced by the storage engine and the command pipeline.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// The decoder detected malformed input; the connection must close.
    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),
    /// A command failed its syntactic validation.
    #[error("{0}")]
    Validation(String),
    /// Underlying socket or file IO failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The replication handshake failed on the replica side.
    #[error("replication handshake failed: {0}")]
    Handshake(String),
}

/// Result alias used throughout the engine and server crates.
pub type KvResult<T> = Result<T, KvError>;

impl KvError {
    /// Builds a validation error from a `fmt::Display`-able reason.
    pub fn validation(reason: impl fmt::Display) -> Self {
        KvError::Validation(reason.to_string())
    }
}
