//! # vigil - directory-integrity monitoring core
//!
//! vigil watches a set of directories for filesystem change events and
//! determines which changes are unauthorized. This crate is the watch
//! registry and event-correlation engine: it maintains a self-balancing
//! ordered index from watch identifiers to the paths they represent,
//! decodes the raw variable-length notification stream, and classifies
//! each change against an authorization state.
//!
//! ## Core pieces
//!
//! - [`OrderedIndex`]: generic AVL map, no filesystem knowledge
//! - [`WatchRegistry`]: id-to-path mapping with authorization windows
//! - [`decode`]: raw buffer to structured [`ChangeEvent`]s, overrun-proof
//! - [`CorrelationEngine`]: change classification against the
//!   [`AuthorizationOracle`]
//! - [`Dispatcher`]: the register/read/decode/correlate loop
//!
//! The OS watch facility and the authorization policy are collaborators
//! behind the [`EventSource`] and [`AuthorizationOracle`] traits; a
//! kernel-backed inotify source ships behind the `inotify` feature.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use vigil::{
//!     ChannelSink, CorrelationEngine, Dispatcher, DispatcherConfig, ScriptedSource, WindowOracle,
//! };
//!
//! let source = ScriptedSource::starting_at(1);
//! let (sink, alerts) = ChannelSink::new(1024);
//! let engine = CorrelationEngine::new(WindowOracle::new(), sink);
//!
//! let mut dispatcher = Dispatcher::new(DispatcherConfig::default(), source, engine);
//! dispatcher.register_all(&[PathBuf::from("/etc")]).unwrap();
//! let handle = dispatcher.spawn().unwrap();
//!
//! // ... consume alerts from `alerts` ...
//! handle.join().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod correlate;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod index;
pub mod oracle;
pub mod registry;
pub mod source;

// Re-export primary types at crate root for convenience
pub use alert::{Alert, AlertKind, AlertSink, AlertStream, ChannelSink, MemorySink, StreamRecvError};
pub use correlate::{CorrelationEngine, Outcome};
pub use decode::{decode, encode_record, HEADER_SIZE};
pub use dispatch::{Dispatcher, DispatcherConfig, DispatcherHandle};
pub use error::{DecodeError, RegistrationError, SourceError, VigilError, VigilResult};
pub use event::{ChangeEvent, EventMask, WatchId};
pub use index::OrderedIndex;
pub use oracle::{AuthorizationOracle, DenyAll, WindowOracle};
pub use registry::{WatchEntry, WatchRegistry};
pub use source::{EventSource, RejectKind, ScriptedRead, ScriptedSource};

#[cfg(all(unix, feature = "inotify"))]
pub use source::inotify::InotifySource;
