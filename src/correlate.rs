//! Event correlation: from decoded change events to alert decisions.
//!
//! For each decoded event the engine resolves the registry entry behind the
//! watch identifier, merges the event with the known path context, and
//! classifies it against the authorization state. Correlation is a pure
//! function of (entry, event, current time) with exactly one side effect
//! (alert emission) and one possible mutation (registry removal when the
//! source revokes a watch).

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::alert::{Alert, AlertKind, AlertSink};
use crate::event::{ChangeEvent, EventMask};
use crate::oracle::AuthorizationOracle;
use crate::registry::WatchRegistry;

/// What correlation decided for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A Change alert was emitted.
    Alerted,
    /// The change fell inside an authorization window; recorded, not alerted.
    Suppressed,
    /// The source revoked the watch; its entry was removed.
    Removed,
    /// The source's queue overflowed; an Overflow alert was emitted.
    Overflow,
    /// No registry entry for the identifier; an UnknownWatch alert was
    /// emitted.
    Unknown,
}

/// Correlates decoded events against the registry and authorization oracle.
#[derive(Debug)]
pub struct CorrelationEngine<O, S> {
    oracle: O,
    sink: S,
}

impl<O: AuthorizationOracle, S: AlertSink> CorrelationEngine<O, S> {
    /// Creates an engine over the given oracle and alert sink.
    pub fn new(oracle: O, sink: S) -> Self {
        Self { oracle, sink }
    }

    /// The oracle in use.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// The sink in use.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Correlates one decoded event.
    ///
    /// Evaluation order matters: overflow carries no attributable watch
    /// (the source reports it on a sentinel identifier), and a revocation
    /// must drop the entry synchronously so the source may recycle the id
    /// before the next buffer is read.
    pub fn correlate(
        &self,
        registry: &mut WatchRegistry,
        event: &ChangeEvent,
        now: DateTime<Utc>,
    ) -> Outcome {
        if event.is_overflow() {
            warn!("event queue overflowed; this interval may be incomplete");
            self.sink.emit(Alert {
                kind: AlertKind::Overflow,
                path: None,
                name: None,
                mask: event.mask,
                timestamp: now,
            });
            return Outcome::Overflow;
        }

        if event.is_watch_removed() {
            registry.remove(event.id);
            return Outcome::Removed;
        }

        let Some(entry) = registry.resolve(event.id) else {
            warn!(id = %event.id, mask = %event.mask, "event for unrecognized watch");
            self.sink.emit(Alert {
                kind: AlertKind::UnknownWatch,
                path: None,
                name: event.name.clone(),
                mask: event.mask,
                timestamp: now,
            });
            return Outcome::Unknown;
        };

        if entry.window_open_at(now)
            || self
                .oracle
                .is_authorized(&entry.path, event.name.as_deref(), now)
        {
            debug!(
                path = %entry.path.display(),
                name = event.name.as_deref().unwrap_or(""),
                mask = %event.mask,
                "authorized change recorded"
            );
            return Outcome::Suppressed;
        }

        if !event.mask.intersects(EventMask::CHANGES) {
            // Masks outside the change set (e.g. source-internal bookkeeping
            // bits) carry nothing to alert on.
            debug!(id = %event.id, mask = %event.mask, "non-change event ignored");
            return Outcome::Suppressed;
        }

        self.sink.emit(Alert {
            kind: AlertKind::Change,
            path: Some(entry.path.clone()),
            name: event.name.clone(),
            mask: event.mask,
            timestamp: now,
        });
        Outcome::Alerted
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::alert::MemorySink;
    use crate::event::WatchId;
    use crate::oracle::{DenyAll, WindowOracle};
    use crate::source::ScriptedSource;

    fn event(id: i32, mask: EventMask, name: Option<&str>) -> ChangeEvent {
        ChangeEvent {
            id: WatchId::new(id),
            mask,
            cookie: 0,
            name: name.map(str::to_string),
        }
    }

    fn registry_with(paths: &[(i32, &str)]) -> WatchRegistry {
        let mut registry = WatchRegistry::new();
        for (raw_id, path) in paths {
            let mut source = ScriptedSource::starting_at(*raw_id);
            registry.register(&mut source, Path::new(path)).unwrap();
        }
        registry
    }

    #[test]
    fn monitoring_state_alerts_on_change() {
        let mut registry = registry_with(&[(7, "/var/spool")]);
        let engine = CorrelationEngine::new(DenyAll, MemorySink::new());

        let outcome = engine.correlate(
            &mut registry,
            &event(7, EventMask::MODIFIED, Some("cron")),
            Utc::now(),
        );

        assert_eq!(outcome, Outcome::Alerted);
        let alerts = engine.sink().alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Change);
        assert_eq!(alerts[0].path.as_deref(), Some(Path::new("/var/spool")));
        assert_eq!(alerts[0].name.as_deref(), Some("cron"));
    }

    #[test]
    fn unknown_watch_is_warned_not_alerted_as_change() {
        let mut registry = WatchRegistry::new();
        let engine = CorrelationEngine::new(DenyAll, MemorySink::new());

        let outcome = engine.correlate(
            &mut registry,
            &event(42, EventMask::MODIFIED, Some("x")),
            Utc::now(),
        );

        assert_eq!(outcome, Outcome::Unknown);
        let alerts = engine.sink().alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::UnknownWatch);
        assert_eq!(alerts[0].path, None);
    }

    #[test]
    fn watch_removed_drops_the_entry_without_alerting() {
        let mut registry = registry_with(&[(3, "/etc")]);
        let engine = CorrelationEngine::new(DenyAll, MemorySink::new());

        let outcome = engine.correlate(
            &mut registry,
            &event(3, EventMask::WATCH_REMOVED, None),
            Utc::now(),
        );

        assert_eq!(outcome, Outcome::Removed);
        assert!(engine.sink().is_empty());
        assert!(registry.resolve(WatchId::new(3)).is_none());

        // A later event for the same id is unknown, not a change.
        let outcome = engine.correlate(
            &mut registry,
            &event(3, EventMask::MODIFIED, Some("passwd")),
            Utc::now(),
        );
        assert_eq!(outcome, Outcome::Unknown);
    }

    #[test]
    fn entry_window_suppresses_alerts() {
        let mut registry = registry_with(&[(3, "/etc")]);
        let now = Utc::now();
        registry.authorize(Path::new("/etc"), chrono::Duration::seconds(60), now);

        let engine = CorrelationEngine::new(DenyAll, MemorySink::new());
        let outcome = engine.correlate(
            &mut registry,
            &event(3, EventMask::MODIFIED, Some("passwd")),
            now + chrono::Duration::seconds(30),
        );
        assert_eq!(outcome, Outcome::Suppressed);
        assert!(engine.sink().is_empty());

        // Past the window the same change alerts again.
        let outcome = engine.correlate(
            &mut registry,
            &event(3, EventMask::MODIFIED, Some("passwd")),
            now + chrono::Duration::seconds(90),
        );
        assert_eq!(outcome, Outcome::Alerted);
        assert_eq!(engine.sink().len(), 1);
    }

    #[test]
    fn oracle_window_suppresses_alerts() {
        let mut registry = registry_with(&[(3, "/etc")]);
        let oracle = WindowOracle::new();
        oracle.open_window(Path::new("/etc"), chrono::Duration::seconds(60));

        let engine = CorrelationEngine::new(oracle, MemorySink::new());
        let outcome = engine.correlate(
            &mut registry,
            &event(3, EventMask::CREATED, Some("hosts.new")),
            Utc::now(),
        );
        assert_eq!(outcome, Outcome::Suppressed);
        assert!(engine.sink().is_empty());
    }

    #[test]
    fn overflow_emits_distinguished_alert() {
        let mut registry = registry_with(&[(3, "/etc")]);
        let engine = CorrelationEngine::new(DenyAll, MemorySink::new());

        let outcome = engine.correlate(
            &mut registry,
            &event(-1, EventMask::QUEUE_OVERFLOW, None),
            Utc::now(),
        );

        assert_eq!(outcome, Outcome::Overflow);
        let alerts = engine.sink().alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Overflow);
        assert_eq!(alerts[0].path, None);

        // Monitoring continues: the registry is untouched.
        assert!(registry.resolve(WatchId::new(3)).is_some());
    }

    #[test]
    fn non_change_bookkeeping_masks_are_ignored() {
        let mut registry = registry_with(&[(3, "/etc")]);
        let engine = CorrelationEngine::new(DenyAll, MemorySink::new());

        // A mask bit outside the change set, e.g. IN_OPEN-style noise.
        let outcome = engine.correlate(
            &mut registry,
            &event(3, EventMask::from_raw(0x20), None),
            Utc::now(),
        );
        assert_eq!(outcome, Outcome::Suppressed);
        assert!(engine.sink().is_empty());
    }
}
