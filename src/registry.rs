//! Watch registry: the id-to-path mapping and its authorization state.
//!
//! Built on [`OrderedIndex`], the registry owns one [`WatchEntry`] per
//! active watch. The mapping is a bijection while a watch is active: ids are
//! never shared and removal fully deletes the node, so the event source is
//! free to recycle an id once `remove` has returned.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RegistrationError;
use crate::event::WatchId;
use crate::index::OrderedIndex;
use crate::source::EventSource;

/// One active watch: the directory it covers and its authorization window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    /// The identifier the event source assigned at registration.
    pub id: WatchId,

    /// Absolute path of the watched directory.
    pub path: PathBuf,

    /// End of the currently open authorization window, if any. Changes
    /// timestamped inside the window are expected and not alerted.
    pub authorized_until: Option<DateTime<Utc>>,
}

impl WatchEntry {
    /// True if an authorization window is open at `at`.
    #[must_use]
    pub fn window_open_at(&self, at: DateTime<Utc>) -> bool {
        self.authorized_until.is_some_and(|until| at < until)
    }
}

/// Dynamically-updatable mapping from watch identifiers to watch entries.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    index: OrderedIndex<WatchId, WatchEntry>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: OrderedIndex::new(),
        }
    }

    /// Number of active watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if no watches are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Registers `path` with the event source and records the entry.
    ///
    /// # Errors
    ///
    /// Propagates the source's [`RegistrationError`]; nothing is added to
    /// the index in that case.
    pub fn register(
        &mut self,
        source: &mut dyn EventSource,
        path: &Path,
    ) -> Result<WatchId, RegistrationError> {
        let id = source.register(path)?;
        let entry = WatchEntry {
            id,
            path: path.to_path_buf(),
            authorized_until: None,
        };
        debug!(%id, path = %entry.path.display(), "watch registered");
        // The source hands out unique ids for active watches; an existing
        // entry under this id would mean a stale entry was never removed.
        self.index.insert(id, entry);
        Ok(id)
    }

    /// Resolves an identifier to its entry.
    #[must_use]
    pub fn resolve(&self, id: WatchId) -> Option<&WatchEntry> {
        self.index.lookup(&id)
    }

    /// Resolves an identifier to a mutable entry.
    pub fn resolve_mut(&mut self, id: WatchId) -> Option<&mut WatchEntry> {
        self.index.lookup_mut(&id)
    }

    /// Removes a watch entry.
    ///
    /// Idempotent: removing an id with no entry is a no-op returning `None`,
    /// because the source may have revoked the watch out-of-band already.
    pub fn remove(&mut self, id: WatchId) -> Option<WatchEntry> {
        let removed = self.index.remove(&id);
        if let Some(entry) = removed.as_ref() {
            debug!(%id, path = %entry.path.display(), "watch removed");
        }
        removed
    }

    /// Opens an authorization window of `duration` starting at `now` on the
    /// entry for `path` and on entries nested under it.
    ///
    /// Returns the number of entries the window was applied to; zero means
    /// the path is not tracked.
    pub fn authorize(&mut self, path: &Path, duration: Duration, now: DateTime<Utc>) -> usize {
        let matching: Vec<WatchId> = self
            .index
            .in_order()
            .filter(|(_, entry)| entry.path == path || entry.path.starts_with(path))
            .map(|(id, _)| *id)
            .collect();

        let until = now + duration;
        for id in &matching {
            if let Some(entry) = self.index.lookup_mut(id) {
                entry.authorized_until = Some(until);
                debug!(%id, path = %entry.path.display(), %until, "authorization window opened");
            }
        }
        matching.len()
    }

    /// All watched paths, ascending by watch identifier.
    #[must_use]
    pub fn all_paths(&self) -> Vec<PathBuf> {
        self.index
            .in_order()
            .map(|(_, entry)| entry.path.clone())
            .collect()
    }

    /// Removes every entry, returning them ascending by identifier.
    ///
    /// Used on shutdown to release all watches in a defined order.
    pub fn drain(&mut self) -> Vec<WatchEntry> {
        let entries: Vec<WatchEntry> = self
            .index
            .in_order()
            .map(|(_, entry)| entry.clone())
            .collect();
        self.index.clear();
        entries
    }
}
