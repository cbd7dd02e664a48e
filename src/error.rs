//! Error taxonomy (spec §7).
//!
//! Mirrors the teacher's hand-rolled `Error` enum with manual `From` impls rather
//! than a derive macro: the taxonomy is small and closed, and every variant needs
//! its own bespoke constructor (detail string, QMI error code, ...).

use core::fmt;

use crate::qmi::ProtocolError;

/// A structured error drawn from the §7 taxonomy.
#[derive(Debug)]
pub enum Error {
    /// Device or firmware lacks the required TLV/message.
    Unsupported(String),
    /// QMI-level failure prior to any protocol-layer result.
    Transport(String),
    /// A QMI result TLV reports failure.
    Protocol(ProtocolError),
    /// Timeout waiting for a correlated indication.
    Aborted(String),
    /// Malformed argument.
    Validation(String),
    /// Carrier config mapping/list lacks the requested entry.
    NotFound(String),
    /// Assistance data exceeds device-advertised limits.
    TooMany(String),
    /// Invariant violation - programmer error.
    Fatal(String),
}

impl Error {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Error::Aborted(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Error::Fatal(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsupported(m) => write!(f, "unsupported by device: {m}"),
            Error::Transport(m) => write!(f, "transport error: {m}"),
            Error::Protocol(code) => write!(f, "protocol error: {code:?}"),
            Error::Aborted(m) => write!(f, "aborted: {m}"),
            Error::Validation(m) => write!(f, "validation error: {m}"),
            Error::NotFound(m) => write!(f, "not found: {m}"),
            Error::TooMany(m) => write!(f, "too many: {m}"),
            Error::Fatal(m) => write!(f, "fatal: {m}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Aborted("timed out waiting for response".into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

