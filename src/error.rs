//! Error types for the tokenpipe crate.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// A specialized Result type for tokenpipe operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for tokenpipe operations.
///
/// Chain-construction errors (`InvalidChain`, `IncompleteChain`, `Encoding`)
/// are surfaced synchronously before any generation work starts. Producer
/// failures are additionally reflected in the readback channel's failed
/// state so a draining consumer observes them too.
#[derive(Debug)]
pub enum Error {
    /// A chain handle was used after it had already been consumed
    InvalidChain(String),
    /// A chain was finalized without a terminal selection stage
    IncompleteChain(String),
    /// Prompt, grammar, or stop-string text contains an embedded NUL terminator
    Encoding(String),
    /// The generation run terminated abnormally
    Producer(String),
    /// The readback channel was written to after it was finalized
    ChannelMisuse(String),
    /// Configuration errors
    Config(String),
    /// Engine-boundary runtime errors
    Runtime(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidChain(msg) => write!(f, "Invalid chain handle: {}", msg),
            Error::IncompleteChain(msg) => write!(f, "Incomplete chain: {}", msg),
            Error::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            Error::Producer(msg) => write!(f, "Producer failure: {}", msg),
            Error::ChannelMisuse(msg) => write!(f, "Channel misuse: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl StdError for Error {}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
