//! Top-level dispatcher loop.
//!
//! The dispatcher owns the registry, the event source, and the correlation
//! engine, and runs the read/decode/correlate cycle single-threaded so
//! registry mutations and event correlation stay linearizable. The source
//! read is the only blocking point; a stop signal takes effect within one
//! polling interval. On every exit path, including fatal read errors, the
//! registry is drained in order and the source handle released.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::alert::AlertSink;
use crate::correlate::CorrelationEngine;
use crate::decode::decode;
use crate::error::{SourceError, VigilError, VigilResult};
use crate::oracle::AuthorizationOracle;
use crate::registry::WatchRegistry;
use crate::source::EventSource;

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long one source read may block before the loop re-polls. This
    /// bounds how quickly a stop signal takes effect.
    pub poll_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(250),
        }
    }
}

/// Orchestrates registration, event decoding, and correlation.
#[derive(Debug)]
pub struct Dispatcher<Src, O, S> {
    config: DispatcherConfig,
    source: Src,
    registry: WatchRegistry,
    engine: CorrelationEngine<O, S>,
}

impl<Src, O, S> Dispatcher<Src, O, S>
where
    Src: EventSource,
    O: AuthorizationOracle,
    S: AlertSink,
{
    /// Creates a dispatcher over an initialized source and engine.
    pub fn new(config: DispatcherConfig, source: Src, engine: CorrelationEngine<O, S>) -> Self {
        Self {
            config,
            source,
            registry: WatchRegistry::new(),
            engine,
        }
    }

    /// The registry of active watches.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// The authorization oracle in use.
    pub fn oracle(&self) -> &O {
        self.engine.oracle()
    }

    /// Registers every requested directory.
    ///
    /// A single directory's failure never aborts registration of the others;
    /// it is logged and skipped. Returns how many directories registered.
    ///
    /// # Errors
    ///
    /// Fails only when `paths` is non-empty and *no* directory could be
    /// registered: with nothing watched there is nothing to monitor.
    pub fn register_all(&mut self, paths: &[PathBuf]) -> VigilResult<usize> {
        let mut registered = 0usize;
        for path in paths {
            match self.registry.register(&mut self.source, path) {
                Ok(id) => {
                    info!(%id, path = %path.display(), "monitoring directory");
                    registered += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to watch directory");
                }
            }
        }

        if registered == 0 && !paths.is_empty() {
            return Err(VigilError::internal(
                "no directories could be registered for watching",
            ));
        }
        Ok(registered)
    }

    /// Opens an authorization window on matching registry entries and in the
    /// oracle, so expected changes inside it are recorded but not alerted.
    pub fn authorize(&mut self, path: &Path, duration: chrono::Duration) -> usize {
        self.engine.oracle().open_window(path, duration);
        self.registry.authorize(path, duration, Utc::now())
    }

    /// Runs the monitoring loop until `stop` fires or a fatal error occurs.
    ///
    /// Shutdown releases all registry entries in identifier order and closes
    /// the source handle on every exit path.
    pub fn run(&mut self, stop: &Receiver<()>) -> VigilResult<()> {
        let result = self.run_loop(stop);
        self.shutdown();
        result
    }

    fn run_loop(&mut self, stop: &Receiver<()>) -> VigilResult<()> {
        loop {
            match stop.try_recv() {
                Ok(()) => {
                    info!("stop signal received");
                    return Ok(());
                }
                // A dropped stop handle means the controller is gone; treat
                // it as a stop rather than running unsupervised forever.
                Err(TryRecvError::Disconnected) => {
                    info!("stop handle dropped; shutting down");
                    return Ok(());
                }
                Err(TryRecvError::Empty) => {}
            }

            // Once per polling interval, drop authorization windows that have
            // ended so a long-running monitor does not accumulate them.
            self.engine.oracle().expire(Utc::now());

            let buf = match self.source.read_events(self.config.poll_timeout) {
                Ok(Some(buf)) => buf,
                Ok(None) => continue,
                Err(SourceError::Interrupted) => {
                    debug!("source read interrupted; retrying");
                    continue;
                }
                Err(err) => {
                    error!(%err, "event source failed");
                    return Err(err.into());
                }
            };

            match decode(&buf) {
                Ok(events) => {
                    let now = Utc::now();
                    for event in &events {
                        self.engine.correlate(&mut self.registry, event, now);
                    }
                }
                Err(err) => {
                    // The rest of this cycle's bytes cannot be trusted;
                    // discard them and resume on the next aligned buffer.
                    error!(%err, "discarding malformed read cycle");
                }
            }
        }
    }

    fn shutdown(&mut self) {
        for entry in self.registry.drain() {
            debug!(id = %entry.id, path = %entry.path.display(), "released watch");
        }
        self.source.close();
        info!("dispatcher stopped");
    }
}

impl<Src, O, S> Dispatcher<Src, O, S>
where
    Src: EventSource + Send + 'static,
    O: AuthorizationOracle + 'static,
    S: AlertSink + 'static,
{
    /// Runs the dispatcher loop on a dedicated named thread.
    ///
    /// # Errors
    ///
    /// Fails if the OS refuses to spawn the thread.
    pub fn spawn(mut self) -> VigilResult<DispatcherHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("vigil-dispatch".to_string())
            .spawn(move || self.run(&stop_rx))
            .map_err(|err| VigilError::internal(format!("failed to spawn dispatcher: {err}")))?;

        Ok(DispatcherHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Controller for a spawned dispatcher.
///
/// Dropping the handle signals the loop to stop but does not wait for it;
/// call [`DispatcherHandle::join`] for a synchronous shutdown.
#[derive(Debug)]
pub struct DispatcherHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<VigilResult<()>>>,
}

impl DispatcherHandle {
    /// Signals the loop to stop. Non-blocking and idempotent; takes effect
    /// within one polling interval.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Stops the loop and waits for it to finish, returning its result.
    pub fn join(mut self) -> VigilResult<()> {
        self.stop();
        match self.join.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| VigilError::internal("dispatcher thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        // Signal but do not join: the loop exits within one poll interval
        // once the stop channel fires or disconnects.
        self.stop();
    }
}
