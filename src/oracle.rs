//! The authorization oracle collaborator.
//!
//! The core does not define an authorization policy language; it asks an
//! oracle whether a given change was expected. Whether authorization is
//! scoped per file, per directory, or process-wide is the oracle
//! implementation's decision. [`WindowOracle`] is the reference policy: a
//! process-wide table of per-path time windows. [`DenyAll`] authorizes
//! nothing and is the default when no policy is configured.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

/// Decides whether a change to `name` under `path` at `timestamp` was
/// pre-authorized. Concrete policy (manifests, hashing, allow-lists) lives
/// behind this trait.
pub trait AuthorizationOracle: Send + Sync {
    /// True if the change is expected and must not be alerted.
    fn is_authorized(&self, path: &Path, name: Option<&str>, timestamp: DateTime<Utc>) -> bool;

    /// Opens an authorization window of `duration` for `path` starting now.
    fn open_window(&self, path: &Path, duration: Duration);

    /// Drops time-bounded authorization state that ended at or before `now`.
    ///
    /// Called periodically by the dispatcher so long-running monitors do not
    /// accumulate dead windows. Policies without such state need not
    /// override this.
    fn expire(&self, _now: DateTime<Utc>) {}
}

/// Oracle that authorizes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAll;

impl AuthorizationOracle for DenyAll {
    fn is_authorized(&self, _path: &Path, _name: Option<&str>, _timestamp: DateTime<Utc>) -> bool {
        false
    }

    fn open_window(&self, _path: &Path, _duration: Duration) {}
}

/// Process-wide window table: a change is authorized while a window opened
/// for its directory (or an ancestor of it) is still running.
#[derive(Debug, Default)]
pub struct WindowOracle {
    windows: RwLock<HashMap<PathBuf, DateTime<Utc>>>,
}

impl WindowOracle {
    /// Creates an oracle with no open windows.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthorizationOracle for WindowOracle {
    fn is_authorized(&self, path: &Path, _name: Option<&str>, timestamp: DateTime<Utc>) -> bool {
        let Ok(windows) = self.windows.read() else {
            // A poisoned table authorizes nothing; alerting too much is the
            // safe failure direction for an integrity monitor.
            return false;
        };
        windows
            .iter()
            .any(|(base, until)| timestamp < *until && path.starts_with(base))
    }

    fn open_window(&self, path: &Path, duration: Duration) {
        if let Ok(mut windows) = self.windows.write() {
            let until = Utc::now() + duration;
            let slot = windows.entry(path.to_path_buf()).or_insert(until);
            // Never shorten a window that is already open for longer.
            if *slot < until {
                *slot = until;
            }
        }
    }

    fn expire(&self, now: DateTime<Utc>) {
        if let Ok(mut windows) = self.windows.write() {
            windows.retain(|_, until| *until > now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_oracle_object_safe(_: &dyn AuthorizationOracle) {}

    #[test]
    fn deny_all_denies() {
        let oracle = DenyAll;
        assert!(!oracle.is_authorized(Path::new("/etc"), Some("passwd"), Utc::now()));
    }

    #[test]
    fn window_authorizes_until_expiry() {
        let oracle = WindowOracle::new();
        oracle.open_window(Path::new("/etc"), Duration::seconds(60));

        let now = Utc::now();
        assert!(oracle.is_authorized(Path::new("/etc"), Some("passwd"), now));
        assert!(!oracle.is_authorized(
            Path::new("/etc"),
            Some("passwd"),
            now + Duration::seconds(120)
        ));
    }

    #[test]
    fn window_covers_nested_paths() {
        let oracle = WindowOracle::new();
        oracle.open_window(Path::new("/etc"), Duration::seconds(60));

        let now = Utc::now();
        assert!(oracle.is_authorized(Path::new("/etc/cron.d"), Some("job"), now));
        assert!(!oracle.is_authorized(Path::new("/var/spool"), Some("cron"), now));
    }

    #[test]
    fn reopening_never_shortens_a_window() {
        let oracle = WindowOracle::new();
        oracle.open_window(Path::new("/etc"), Duration::seconds(600));
        oracle.open_window(Path::new("/etc"), Duration::seconds(1));

        let later = Utc::now() + Duration::seconds(300);
        assert!(oracle.is_authorized(Path::new("/etc"), None, later));
    }

    #[test]
    fn expire_drops_finished_windows() {
        let oracle = WindowOracle::new();
        oracle.open_window(Path::new("/etc"), Duration::seconds(60));
        oracle.expire(Utc::now() + Duration::seconds(120));
        assert!(!oracle.is_authorized(Path::new("/etc"), None, Utc::now()));
    }
}
