//! Kernel-backed event source using Linux inotify.
//!
//! Available behind the `inotify` feature on Unix targets. The kernel emits
//! records in the exact layout the decoder consumes (host byte order, which
//! is little-endian on every supported Linux target), so buffers read here
//! are handed to [`crate::decode::decode`] unmodified. Reads go through
//! `poll(2)` so the dispatcher's stop signal is honored within one polling
//! interval.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::{RegistrationError, SourceError};
use crate::event::WatchId;
use crate::source::EventSource;

/// Change kinds requested per watch. `IN_ONLYDIR` makes the kernel reject
/// non-directories at registration instead of silently watching a file.
const WATCH_MASK: u32 = libc::IN_CREATE
    | libc::IN_MODIFY
    | libc::IN_DELETE
    | libc::IN_ATTRIB
    | libc::IN_MOVED_FROM
    | libc::IN_MOVED_TO
    | libc::IN_DELETE_SELF
    | libc::IN_ONLYDIR;

/// Room for a burst of events with maximal names, per inotify(7) guidance.
const READ_BUFFER_SIZE: usize = 256 * (16 + 255 + 1);

/// Event source over a Linux inotify descriptor.
#[derive(Debug)]
pub struct InotifySource {
    fd: RawFd,
    closed: bool,
}

impl InotifySource {
    /// Initializes an inotify instance.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Init`] with the originating errno when the
    /// kernel refuses (e.g. instance or descriptor limits).
    pub fn new() -> Result<Self, SourceError> {
        // Safety: inotify_init1 takes no pointers.
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(SourceError::Init {
                message: format!("inotify_init1 failed: {err}"),
                code: err.raw_os_error(),
            });
        }
        debug!(fd, "inotify initialized");
        Ok(Self { fd, closed: false })
    }
}

fn map_register_errno(err: &io::Error, path: &Path) -> RegistrationError {
    let path = path.to_path_buf();
    match err.raw_os_error() {
        Some(libc::ENOTDIR) => RegistrationError::NotADirectory { path },
        Some(libc::ENOENT) => RegistrationError::NotFound { path },
        Some(libc::EACCES) => RegistrationError::PermissionDenied { path },
        Some(libc::ENOSPC) => RegistrationError::TooManyWatches { path },
        _ => RegistrationError::Backend {
            path,
            message: err.to_string(),
        },
    }
}

impl EventSource for InotifySource {
    fn register(&mut self, path: &Path) -> Result<WatchId, RegistrationError> {
        let c_path =
            CString::new(path.as_os_str().as_bytes()).map_err(|_| RegistrationError::Backend {
                path: path.to_path_buf(),
                message: "path contains an interior NUL byte".to_string(),
            })?;

        // Safety: c_path outlives the call and is NUL terminated.
        let wd = unsafe { libc::inotify_add_watch(self.fd, c_path.as_ptr(), WATCH_MASK) };
        if wd < 0 {
            let err = io::Error::last_os_error();
            return Err(map_register_errno(&err, path));
        }
        Ok(WatchId::new(wd))
    }

    fn read_events(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }

        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // Safety: pollfd is a valid array of length 1 for the call duration.
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EINTR) => Err(SourceError::Interrupted),
                code => Err(SourceError::Io {
                    message: format!("poll failed: {err}"),
                    code,
                }),
            };
        }
        if ready == 0 {
            return Ok(None);
        }

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        // Safety: buf is valid writable memory of the stated length. The
        // kernel only ever returns whole inotify records from one read.
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EINTR) => Err(SourceError::Interrupted),
                Some(libc::EAGAIN) => Ok(None),
                code => Err(SourceError::Io {
                    message: format!("read failed: {err}"),
                    code,
                }),
            };
        }
        if n == 0 {
            return Err(SourceError::Closed);
        }

        buf.truncate(usize::try_from(n).unwrap_or(0));
        Ok(Some(buf))
    }

    fn close(&mut self) {
        if !self.closed {
            // Safety: fd is owned by this source and closed exactly once.
            unsafe {
                libc::close(self.fd);
            }
            self.closed = true;
            debug!(fd = self.fd, "inotify closed");
        }
    }
}

impl Drop for InotifySource {
    fn drop(&mut self) {
        self.close();
    }
}
