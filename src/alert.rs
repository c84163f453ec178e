//! Alerts and the alert sink collaborator.
//!
//! Alerts are serializable so sinks can forward them unmodified. The
//! channel-backed sink never blocks the correlation path: a slow consumer
//! costs dropped alerts, counted and queryable, not a stalled monitor.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::EventMask;

/// Errors receiving from an [`AlertStream`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreamRecvError {
    /// No alert arrived within the timeout.
    #[error("alert stream receive timed out")]
    Timeout,
    /// The sink side was dropped; no more alerts will arrive.
    #[error("alert stream disconnected")]
    Disconnected,
}

/// Classification of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A tracked path changed without authorization.
    Change,
    /// The source's queue dropped events; this interval may have gaps.
    Overflow,
    /// An event arrived for an identifier with no registry entry.
    UnknownWatch,
}

/// One emitted alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// What kind of alert this is.
    pub kind: AlertKind,

    /// The watched directory, when the event could be attributed to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Filename within the directory, for file-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The change kinds observed.
    pub mask: EventMask,

    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
}

/// Consumer of alerts.
pub trait AlertSink: Send {
    /// Delivers one alert. Must not block the caller indefinitely.
    fn emit(&self, alert: Alert);
}

/// Bounded-channel sink.
///
/// `emit` uses a non-blocking send; when the subscriber is slow the alert is
/// dropped and counted rather than stalling event correlation.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<Alert>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Creates a sink/stream pair with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, AlertStream) {
        let (tx, rx) = bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let sink = Self {
            tx,
            dropped: Arc::clone(&dropped),
        };
        (sink, AlertStream { rx, dropped })
    }

    /// Number of alerts dropped because the subscriber lagged.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for ChannelSink {
    fn emit(&self, alert: Alert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Receiving side of a [`ChannelSink`].
#[derive(Debug)]
pub struct AlertStream {
    rx: Receiver<Alert>,
    dropped: Arc<AtomicU64>,
}

impl AlertStream {
    /// Receives the next alert, blocking until one arrives or the sink is
    /// dropped.
    pub fn recv(&self) -> Option<Alert> {
        self.rx.recv().ok()
    }

    /// Receives the next alert with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Alert, StreamRecvError> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StreamRecvError::Timeout,
            RecvTimeoutError::Disconnected => StreamRecvError::Disconnected,
        })
    }

    /// Non-blocking receive.
    #[must_use]
    pub fn try_recv(&self) -> Option<Alert> {
        self.rx.try_recv().ok()
    }

    /// Number of alerts dropped because this stream lagged.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Sink that records alerts in memory; the reference implementation for
/// embedded use and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    alerts: std::sync::Mutex<Vec<Alert>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All alerts emitted so far, in emission order.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Number of alerts emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// True if nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for MemorySink {
    fn emit(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}

// Shared references and Arcs are sinks too. `Sync` is required on top of
// the trait's `Send` supertrait: a `&S` or `Arc<S>` is only `Send` when the
// underlying sink can be shared between threads.
impl<S: AlertSink + Sync + ?Sized> AlertSink for &S {
    fn emit(&self, alert: Alert) {
        (**self).emit(alert);
    }
}

impl<S: AlertSink + Sync + ?Sized> AlertSink for Arc<S> {
    fn emit(&self, alert: Alert) {
        (**self).emit(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventMask;

    fn change_alert(name: &str) -> Alert {
        Alert {
            kind: AlertKind::Change,
            path: Some(PathBuf::from("/etc")),
            name: Some(name.to_string()),
            mask: EventMask::MODIFIED,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn channel_sink_delivers_in_order() {
        let (sink, stream) = ChannelSink::new(8);
        sink.emit(change_alert("a"));
        sink.emit(change_alert("b"));

        assert_eq!(stream.recv().unwrap().name.as_deref(), Some("a"));
        assert_eq!(stream.recv().unwrap().name.as_deref(), Some("b"));
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn full_channel_drops_and_counts() {
        let (sink, stream) = ChannelSink::new(1);
        sink.emit(change_alert("kept"));
        sink.emit(change_alert("dropped"));

        assert_eq!(sink.dropped(), 1);
        assert_eq!(stream.dropped(), 1);
        assert_eq!(stream.recv().unwrap().name.as_deref(), Some("kept"));
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn stream_reports_timeout_and_disconnect() {
        let (sink, stream) = ChannelSink::new(1);
        assert_eq!(
            stream.recv_timeout(Duration::from_millis(5)).unwrap_err(),
            StreamRecvError::Timeout
        );
        drop(sink);
        assert_eq!(
            stream.recv_timeout(Duration::from_millis(5)).unwrap_err(),
            StreamRecvError::Disconnected
        );
    }

    #[test]
    fn shared_sinks_emit_through_references_and_arcs() {
        fn emit_into<S: AlertSink>(sink: S, alert: Alert) {
            sink.emit(alert);
        }

        let sink = Arc::new(MemorySink::new());
        emit_into(&*sink, change_alert("by-ref"));

        // The Arc must cross a thread boundary as a sink in its own right.
        let cloned = Arc::clone(&sink);
        std::thread::spawn(move || emit_into(cloned, change_alert("via-arc")))
            .join()
            .unwrap();

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].name.as_deref(), Some("by-ref"));
        assert_eq!(alerts[1].name.as_deref(), Some("via-arc"));
    }

    #[test]
    fn memory_sink_records_everything() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.emit(change_alert("x"));
        sink.emit(change_alert("y"));
        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].name.as_deref(), Some("x"));
    }

    #[test]
    fn alert_serializes_without_absent_fields() {
        let alert = Alert {
            kind: AlertKind::Overflow,
            path: None,
            name: None,
            mask: EventMask::QUEUE_OVERFLOW,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"overflow\""));
        assert!(!json.contains("\"path\""));
        assert!(!json.contains("\"name\""));
    }
}
