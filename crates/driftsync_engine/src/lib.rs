//! # DriftSync Engine
//!
//! Sync state machine and engine for DriftSync.
//!
//! This crate provides:
//! - An observable status machine (idle → syncing → idle/conflict/error)
//! - Single-flight sync: overlapping calls share one round trip
//! - A periodic schedule that pauses offline and resumes on reconnect
//! - Request timeouts and exponential backoff between failed attempts
//! - A transport seam with an HTTP adapter and a test mock
//!
//! ## Architecture
//!
//! The engine composes a [`driftsync_core::ChangeTracker`] with a
//! [`SyncTransport`]: each cycle pushes the tracker's pending changes
//! to the remote authority, and on confirmation marks them applied and
//! merges the server's vector clock. Conflicts surface through the
//! observable state and block scheduled syncs until resolved.
//!
//! ## Key invariants
//!
//! - At most one remote round trip is outstanding at a time
//! - A conflicted response marks nothing applied
//! - A failed round trip retains every pending change
//! - `stop()` never aborts an in-flight round trip

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod state;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, CHANGES_ENDPOINT, RESOLVE_CONFLICT_ENDPOINT};
pub use state::{SyncOutcome, SyncState, SyncStatus};
pub use transport::{MockTransport, SyncTransport};
