//! Watch identifiers, change-kind masks, and decoded change events.
//!
//! These types are intentionally serializable so alerts and events can be
//! streamed to external sinks without a second representation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle for one monitored directory.
///
/// Assigned by the event source at registration time and unique among active
/// watches. The source only recycles an id after the registry entry for it
/// has been removed. Values are signed because the kernel reports queue
/// overflow on a sentinel descriptor of -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(i32);

impl WatchId {
    /// Wrap a raw watch descriptor.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw descriptor value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd:{}", self.0)
    }
}

impl From<i32> for WatchId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// A set of change kinds, bit-compatible with the inotify mask word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMask(u32);

impl EventMask {
    /// No change kinds set.
    pub const EMPTY: Self = Self(0);
    /// A file or directory was created inside the watched directory.
    pub const CREATED: Self = Self(0x0000_0100);
    /// File contents were modified.
    pub const MODIFIED: Self = Self(0x0000_0002);
    /// A file or directory was deleted inside the watched directory.
    pub const DELETED: Self = Self(0x0000_0200);
    /// Metadata changed (permissions, ownership, timestamps).
    pub const METADATA: Self = Self(0x0000_0004);
    /// A file was moved out of the watched directory.
    pub const MOVED_FROM: Self = Self(0x0000_0040);
    /// A file was moved into the watched directory.
    pub const MOVED_TO: Self = Self(0x0000_0080);
    /// The source revoked the watch (explicit removal or directory deleted).
    pub const WATCH_REMOVED: Self = Self(0x0000_8000);
    /// The source's internal queue dropped events for this interval.
    pub const QUEUE_OVERFLOW: Self = Self(0x0000_4000);

    /// All change kinds that describe an actual filesystem change.
    pub const CHANGES: Self = Self(
        Self::CREATED.0
            | Self::MODIFIED.0
            | Self::DELETED.0
            | Self::METADATA.0
            | Self::MOVED_FROM.0
            | Self::MOVED_TO.0,
    );

    /// Build a mask from a raw word.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw mask word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True if every kind in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any kind in `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// The union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if no kinds are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(EventMask, &str); 8] = [
            (EventMask::CREATED, "created"),
            (EventMask::MODIFIED, "modified"),
            (EventMask::DELETED, "deleted"),
            (EventMask::METADATA, "metadata"),
            (EventMask::MOVED_FROM, "moved_from"),
            (EventMask::MOVED_TO, "moved_to"),
            (EventMask::WATCH_REMOVED, "watch_removed"),
            (EventMask::QUEUE_OVERFLOW, "queue_overflow"),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "(none)")?;
        }
        Ok(())
    }
}

/// One structured filesystem change, decoded from the raw notification stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The watch the change occurred under.
    pub id: WatchId,

    /// The kinds of change observed.
    pub mask: EventMask,

    /// Correlator for matched moved-from/moved-to pairs; 0 when unused.
    pub cookie: u32,

    /// Filename relative to the watched directory.
    /// None for directory-level events.
    pub name: Option<String>,
}

impl ChangeEvent {
    /// True if this event signals queue overflow rather than a change.
    #[must_use]
    pub const fn is_overflow(&self) -> bool {
        self.mask.contains(EventMask::QUEUE_OVERFLOW)
    }

    /// True if this event revokes its watch.
    #[must_use]
    pub const fn is_watch_removed(&self) -> bool {
        self.mask.contains(EventMask::WATCH_REMOVED)
    }
}
