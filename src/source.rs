//! The event source collaborator.
//!
//! The core never talks to the OS directly: it consumes an [`EventSource`],
//! which wraps whatever kernel facility actually watches directories and
//! hands back raw whole-record-aligned byte buffers. A kernel-backed
//! implementation lives behind the `inotify` feature; [`ScriptedSource`] is
//! the in-memory reference implementation for embedded use and tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RegistrationError, SourceError};
use crate::event::WatchId;

#[cfg(all(unix, feature = "inotify"))]
pub mod inotify;

/// A source of watch registrations and raw change-notification buffers.
///
/// Initialization is the implementor's constructor. Buffers returned by
/// `read_events` always hold zero or more whole records; the decoder relies
/// on that alignment guarantee.
pub trait EventSource {
    /// Registers a directory and returns its watch identifier.
    ///
    /// Identifiers are unique among active watches and are only recycled
    /// after the caller has dropped its registry entry for them.
    fn register(&mut self, path: &Path) -> Result<WatchId, RegistrationError>;

    /// Blocks up to `timeout` for the next raw buffer.
    ///
    /// Returns `Ok(None)` on timeout so the caller can re-poll without data
    /// loss. `Err(SourceError::Interrupted)` is retryable; any other error
    /// ends the read loop.
    fn read_events(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, SourceError>;

    /// Releases the underlying handle. Idempotent.
    fn close(&mut self);
}

/// One scripted outcome for a `read_events` call.
#[derive(Debug, Clone)]
pub enum ScriptedRead {
    /// Deliver a raw buffer.
    Buffer(Vec<u8>),
    /// Report a poll timeout.
    Timeout,
    /// Report an interrupted read (retryable).
    Interrupted,
    /// Report a closed source (fatal).
    Closed,
}

/// In-memory event source driven by a pre-built script.
///
/// Watch identifiers are assigned sequentially from a configurable start.
/// Once the script is exhausted, reads report `Closed`.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    next_raw_id: i32,
    reads: VecDeque<ScriptedRead>,
    rejections: Vec<(PathBuf, RejectKind)>,
    registered: Vec<(WatchId, PathBuf)>,
    closed: bool,
}

/// Which registration failure a scripted path should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// The path is not a directory.
    NotADirectory,
    /// The caller may not watch the path.
    PermissionDenied,
    /// The per-source watch limit is exhausted.
    TooManyWatches,
    /// The path does not exist.
    NotFound,
}

impl ScriptedSource {
    /// Creates a source that assigns identifiers starting at `first_id`.
    #[must_use]
    pub fn starting_at(first_id: i32) -> Self {
        Self {
            next_raw_id: first_id,
            ..Self::default()
        }
    }

    /// Queues a raw buffer for a future read.
    pub fn push_buffer(&mut self, buf: Vec<u8>) -> &mut Self {
        self.reads.push_back(ScriptedRead::Buffer(buf));
        self
    }

    /// Queues an arbitrary read outcome.
    pub fn push_read(&mut self, read: ScriptedRead) -> &mut Self {
        self.reads.push_back(read);
        self
    }

    /// Makes registration of `path` fail with the given kind.
    pub fn reject(&mut self, path: impl Into<PathBuf>, kind: RejectKind) -> &mut Self {
        self.rejections.push((path.into(), kind));
        self
    }

    /// Paths successfully registered so far, in registration order.
    #[must_use]
    pub fn registered(&self) -> &[(WatchId, PathBuf)] {
        &self.registered
    }

    /// True once `close` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl EventSource for ScriptedSource {
    fn register(&mut self, path: &Path) -> Result<WatchId, RegistrationError> {
        if self.closed {
            return Err(RegistrationError::Backend {
                path: path.to_path_buf(),
                message: "source is closed".to_string(),
            });
        }

        if let Some((_, kind)) = self.rejections.iter().find(|(p, _)| p == path) {
            let path = path.to_path_buf();
            return Err(match kind {
                RejectKind::NotADirectory => RegistrationError::NotADirectory { path },
                RejectKind::PermissionDenied => RegistrationError::PermissionDenied { path },
                RejectKind::TooManyWatches => RegistrationError::TooManyWatches { path },
                RejectKind::NotFound => RegistrationError::NotFound { path },
            });
        }

        let id = WatchId::new(self.next_raw_id);
        self.next_raw_id += 1;
        self.registered.push((id, path.to_path_buf()));
        Ok(id)
    }

    fn read_events(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        match self.reads.pop_front() {
            Some(ScriptedRead::Buffer(buf)) => Ok(Some(buf)),
            Some(ScriptedRead::Timeout) => Ok(None),
            Some(ScriptedRead::Interrupted) => Err(SourceError::Interrupted),
            Some(ScriptedRead::Closed) | None => Err(SourceError::Closed),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: the collaborator trait must stay object-safe.
    fn _assert_event_source_object_safe(_: &dyn EventSource) {}

    #[test]
    fn assigns_sequential_ids_from_start() {
        let mut source = ScriptedSource::starting_at(3);
        let a = source.register(Path::new("/etc")).unwrap();
        let b = source.register(Path::new("/var/spool")).unwrap();
        assert_eq!(a, WatchId::new(3));
        assert_eq!(b, WatchId::new(4));
        assert_eq!(source.registered().len(), 2);
    }

    #[test]
    fn scripted_rejection_maps_to_registration_error() {
        let mut source = ScriptedSource::starting_at(1);
        source.reject("/etc/passwd", RejectKind::NotADirectory);

        let err = source.register(Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, RegistrationError::NotADirectory { .. }));

        // Other paths still register.
        assert!(source.register(Path::new("/etc")).is_ok());
    }

    #[test]
    fn reads_follow_the_script_then_close() {
        let mut source = ScriptedSource::starting_at(1);
        source
            .push_buffer(vec![1, 2, 3])
            .push_read(ScriptedRead::Timeout)
            .push_read(ScriptedRead::Interrupted);

        let timeout = Duration::from_millis(1);
        assert_eq!(source.read_events(timeout).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(source.read_events(timeout).unwrap(), None);
        assert!(matches!(
            source.read_events(timeout),
            Err(SourceError::Interrupted)
        ));
        assert!(matches!(
            source.read_events(timeout),
            Err(SourceError::Closed)
        ));
    }

    #[test]
    fn close_is_sticky() {
        let mut source = ScriptedSource::starting_at(1);
        source.push_buffer(vec![0; 16]);
        source.close();
        assert!(source.is_closed());
        assert!(matches!(
            source.read_events(Duration::from_millis(1)),
            Err(SourceError::Closed)
        ));
        assert!(source.register(Path::new("/etc")).is_err());
        source.close();
        assert!(source.is_closed());
    }
}
