//! Error types for the chat transport
//!
//! Defines top-level application errors, codec size errors, argument
//! errors and send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// These are the errors that reach an entry point: startup, resolution and
/// listener failures. Errors inside a running connection never surface here;
/// they close that connection instead.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (bind, accept, connect)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad command-line arguments
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Address lookup failed
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Address lookup succeeded but produced nothing to connect to
    #[error("no address found for {0}")]
    NoAddress(String),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// Frame decoding errors
///
/// Only byte counts are checked. A buffer of the right length always decodes,
/// whatever it contains.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("header needs exactly {expected} bytes, got {actual}")]
    HeaderLength { expected: usize, actual: usize },

    #[error("body needs exactly {expected} bytes, got {actual}")]
    BodyLength { expected: usize, actual: usize },

    /// Body longer than the u32 size field can describe
    #[error("body of {0} bytes does not fit in a frame")]
    BodyTooLarge(usize),
}

/// Command-line argument errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Wrong number of arguments; carries the usage line
    #[error("Use: {0}")]
    Usage(&'static str),

    /// Port argument is not a valid port number
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// Message send errors
///
/// Occurs when attempting to queue a message on a connection that is
/// closing or closed, or one whose body cannot be framed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Connection closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
