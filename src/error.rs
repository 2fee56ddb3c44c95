// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error types.
//!
//! `StoreError` is what an [`ObjectStore`](crate::object_store::ObjectStore)
//! backend reports. `Error` is what readers, writers and the bucket iterator
//! hand back to callers; transport failures keep their `StoreError` as the
//! source so callers can inspect it through [`Error::backend_error`].

use std::io;

use thiserror::Error;

use crate::constants::OUT_OF_RANGE_MESSAGE;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of a [`StoreError`], used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The store answered with an error response.
    Client,
    /// The endpoint could not be reached, or the request timed out.
    Connection,
    /// A response body failed part way through.
    Body,
    Other,
}

/// Failure reported by an object-store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{code}: {message}")]
    Client {
        code: String,
        message: String,
        /// HTTP status, when the backend knows it.
        status: Option<u16>,
        /// Real object size echoed by a range-not-satisfiable response.
        actual_object_size: Option<u64>,
    },

    #[error("could not connect to the endpoint: {0}")]
    Connection(String),

    #[error("error reading response body: {0}")]
    Body(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn client(code: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        StoreError::Client {
            code: code.into(),
            message: message.into(),
            status,
            actual_object_size: None,
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Client { .. } => StoreErrorKind::Client,
            StoreError::Connection(_) => StoreErrorKind::Connection,
            StoreError::Body(_) => StoreErrorKind::Body,
            StoreError::Other(_) => StoreErrorKind::Other,
        }
    }

    /// Machine-readable error code for client errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Client { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True when the store rejected a range that starts past the end of the object.
    pub fn is_range_not_satisfiable(&self) -> bool {
        match self {
            StoreError::Client { code, message, status, .. } => {
                *status == Some(416) || code == "InvalidRange" || message == OUT_OF_RANGE_MESSAGE
            }
            _ => false,
        }
    }

    pub fn actual_object_size(&self) -> Option<u64> {
        match self {
            StoreError::Client { actual_object_size, .. } => *actual_object_size,
            _ => None,
        }
    }

    /// True for 404-style answers (missing bucket or key).
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::Client { code, status, .. } => {
                *status == Some(404) || matches!(code.as_str(), "NoSuchBucket" | "NoSuchKey" | "NotFound")
            }
            _ => false,
        }
    }
}

/// True when a body read failed because the peer went away mid-transfer.
pub fn is_incomplete_read(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// What kind of failure an [`Error`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure, possibly after retries were exhausted.
    Io,
    /// Bad argument or mode combination, or an unreachable destination.
    Config,
    Unsupported,
    /// The store answered with metadata we could not make sense of.
    Protocol,
}

/// Error returned by readers, writers and the bucket iterator.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: Option<StoreError>,
    },

    #[error("{message}")]
    Config {
        message: String,
        #[source]
        source: Option<StoreError>,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    pub fn io(message: impl Into<String>) -> Self {
        Error::Io { message: message.into(), source: None }
    }

    /// Wrap a backend failure as an I/O failure.
    pub fn store(message: impl Into<String>, source: StoreError) -> Self {
        Error::Io { message: message.into(), source: Some(source) }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config { message: message.into(), source: None }
    }

    pub fn unsupported(what: impl Into<String>) -> Self {
        Error::Unsupported(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } => ErrorKind::Io,
            Error::Config { .. } => ErrorKind::Config,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// The backend error this failure was caused by, if any.
    pub fn backend_error(&self) -> Option<&StoreError> {
        match self {
            Error::Io { source, .. } | Error::Config { source, .. } => source.as_ref(),
            _ => None,
        }
    }

    /// Re-tag a failure as a configuration problem, keeping its cause.
    pub(crate) fn into_config(self, message: impl Into<String>) -> Self {
        match self {
            Error::Io { source, .. } | Error::Config { source, .. } => {
                Error::Config { message: message.into(), source }
            }
            other => other,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::Config => io::ErrorKind::InvalidInput,
            ErrorKind::Protocol => io::ErrorKind::InvalidData,
            ErrorKind::Io => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_not_satisfiable_detection() {
        let by_status = StoreError::client("Whatever", "x", Some(416));
        let by_code = StoreError::client("InvalidRange", "x", None);
        let by_message = StoreError::client("Unknown", OUT_OF_RANGE_MESSAGE, None);
        let other = StoreError::client("NoSuchKey", "missing", Some(404));

        assert!(by_status.is_range_not_satisfiable());
        assert!(by_code.is_range_not_satisfiable());
        assert!(by_message.is_range_not_satisfiable());
        assert!(!other.is_range_not_satisfiable());
        assert!(other.is_not_found());
        assert!(!StoreError::Connection("refused".into()).is_range_not_satisfiable());
    }

    #[test]
    fn backend_error_is_reachable_from_io_failure() {
        let err = Error::store("GET failed", StoreError::Connection("refused".into()));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.backend_error().map(StoreError::kind), Some(StoreErrorKind::Connection));

        let cfg = err.into_config("bucket unreachable");
        assert_eq!(cfg.kind(), ErrorKind::Config);
        assert!(cfg.backend_error().is_some());
    }

    #[test]
    fn io_error_conversion_keeps_kind() {
        let io_err: io::Error = Error::unsupported("truncate").into();
        assert_eq!(io_err.kind(), io::ErrorKind::Unsupported);

        let io_err: io::Error = Error::io("boom").into();
        assert_eq!(io_err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn incomplete_read_kinds() {
        assert!(is_incomplete_read(&io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(is_incomplete_read(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_incomplete_read(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
