//! Kernel-backed source tests. These talk to real inotify and need the
//! `inotify` feature on a Unix host.
#![cfg(all(unix, feature = "inotify"))]

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;
use vigil::{decode, EventMask, EventSource, InotifySource, RegistrationError, SourceError};

#[test]
fn registers_and_observes_file_creation() {
    let dir = tempdir().unwrap();
    let mut source = InotifySource::new().unwrap();
    let id = source.register(dir.path()).unwrap();

    fs::write(dir.path().join("hello.txt"), b"hi").unwrap();

    // The kernel may split creation and modification across reads.
    let mut saw_creation = false;
    for _ in 0..20 {
        match source.read_events(Duration::from_millis(250)).unwrap() {
            Some(buf) => {
                for event in decode(&buf).unwrap() {
                    if event.id == id
                        && event.mask.contains(EventMask::CREATED)
                        && event.name.as_deref() == Some("hello.txt")
                    {
                        saw_creation = true;
                    }
                }
            }
            None => {}
        }
        if saw_creation {
            break;
        }
    }
    assert!(saw_creation, "creation event never arrived");
}

#[test]
fn rejects_missing_and_non_directory_paths() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, b"x").unwrap();

    let mut source = InotifySource::new().unwrap();

    let err = source.register(Path::new("/no/such/dir/anywhere")).unwrap_err();
    assert!(matches!(err, RegistrationError::NotFound { .. }));

    let err = source.register(&file).unwrap_err();
    assert!(matches!(err, RegistrationError::NotADirectory { .. }));
}

#[test]
fn quiet_directory_times_out_without_error() {
    let dir = tempdir().unwrap();
    let mut source = InotifySource::new().unwrap();
    source.register(dir.path()).unwrap();

    let read = source.read_events(Duration::from_millis(50)).unwrap();
    assert!(read.is_none());
}

#[test]
fn reads_after_close_report_closed() {
    let mut source = InotifySource::new().unwrap();
    source.close();
    source.close(); // idempotent

    let err = source.read_events(Duration::from_millis(10)).unwrap_err();
    assert!(matches!(err, SourceError::Closed));
}
