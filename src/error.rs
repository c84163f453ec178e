//! Error types for vigil.
//!
//! All errors are strongly typed using thiserror. Each collaborator concern
//! gets its own enum so callers can pattern match on the exact failure, and
//! the top-level [`VigilError`] classifies which failures are fatal to the
//! monitoring loop and which are retried or merely logged.

use std::path::PathBuf;

use thiserror::Error;

/// Per-directory registration failures.
///
/// These are never fatal to the process: registration of the remaining
/// directories continues and the failure is logged.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The path exists but is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The caller may not watch the path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The offending path.
        path: PathBuf,
    },

    /// The source's watch limit is exhausted.
    #[error("watch limit reached while registering {path}")]
    TooManyWatches {
        /// The path that could not be registered.
        path: PathBuf,
    },

    /// The path does not exist.
    #[error("no such path: {path}")]
    NotFound {
        /// The offending path.
        path: PathBuf,
    },

    /// Any other source-side rejection.
    #[error("event source rejected {path}: {message}")]
    Backend {
        /// The path that could not be registered.
        path: PathBuf,
        /// The source's description of the failure.
        message: String,
    },
}

impl RegistrationError {
    /// The path whose registration failed.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::NotADirectory { path }
            | Self::PermissionDenied { path }
            | Self::TooManyWatches { path }
            | Self::NotFound { path }
            | Self::Backend { path, .. } => path,
        }
    }
}

/// Malformed raw event stream.
///
/// Any of these invalidates the whole read cycle: the remaining bytes of the
/// buffer are discarded rather than guessed at, and the next cycle starts
/// from a fresh whole-record-aligned buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes remain at a record boundary than a fixed header needs.
    #[error("truncated record header at offset {offset}: {remaining} bytes remain, {header_size} needed")]
    TruncatedHeader {
        /// Byte offset of the record start within the buffer.
        offset: usize,
        /// Bytes remaining in the buffer at that offset.
        remaining: usize,
        /// Bytes a fixed header requires.
        header_size: usize,
    },

    /// The header's claimed payload length extends past the buffer end.
    #[error("truncated record at offset {offset}: header claims {claimed} payload bytes, {remaining} remain")]
    TruncatedRecord {
        /// Byte offset of the record start within the buffer.
        offset: usize,
        /// Payload length the header declares.
        claimed: usize,
        /// Payload bytes actually present.
        remaining: usize,
    },

    /// The record's name payload is not valid UTF-8.
    #[error("record name at offset {offset} is not valid UTF-8")]
    InvalidName {
        /// Byte offset of the record start within the buffer.
        offset: usize,
    },
}

/// Event source failures.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The blocking read was interrupted (EINTR-class); the caller retries.
    #[error("event source read interrupted")]
    Interrupted,

    /// The source handle is closed or unusable; fatal to the loop.
    #[error("event source closed")]
    Closed,

    /// The source could not be initialized; fatal to startup.
    #[error("event source initialization failed: {message}")]
    Init {
        /// Human-readable description of the failure.
        message: String,
        /// The originating OS error code, if any.
        code: Option<i32>,
    },

    /// Any other read-side I/O failure.
    #[error("event source I/O error: {message}")]
    Io {
        /// Human-readable description of the failure.
        message: String,
        /// The originating OS error code, if any.
        code: Option<i32>,
    },
}

impl SourceError {
    /// The originating OS error code, where one exists.
    ///
    /// Used by the binary to propagate fatal initialization failures as the
    /// process exit status.
    #[must_use]
    pub const fn os_error_code(&self) -> Option<i32> {
        match self {
            Self::Interrupted | Self::Closed => None,
            Self::Init { code, .. } | Self::Io { code, .. } => *code,
        }
    }
}

/// Top-level error type for vigil.
#[derive(Debug, Error)]
pub enum VigilError {
    /// A directory could not be registered for watching.
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// The raw event stream was malformed.
    #[error("malformed event stream: {0}")]
    Decode(#[from] DecodeError),

    /// The event source failed.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// An invariant the crate relies on did not hold.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

impl VigilError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error must terminate the monitoring loop.
    ///
    /// Registration failures are per-directory and decode failures cost one
    /// read cycle; neither stops monitoring. Source errors stop the loop
    /// unless they are retryable.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Registration(_) | Self::Decode(_) => false,
            Self::Source(e) => !matches!(e, SourceError::Interrupted),
            Self::Internal { .. } => true,
        }
    }

    /// Returns true if retrying the failed operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Source(SourceError::Interrupted))
    }
}

/// Result type alias for vigil operations.
pub type VigilResult<T> = Result<T, VigilError>;
