//! # DriftSync Protocol
//!
//! Data model and wire messages for DriftSync.
//!
//! This crate provides:
//! - `Change` for causally-stamped mutation records
//! - `VectorClock` for causal ordering between devices
//! - `VersionedRecord` for change-derived snapshots
//! - Protocol messages for the sync endpoints
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod clock;
mod conflict;
mod messages;
mod record;

pub use change::{Change, ChangeId, ChangeOperation};
pub use clock::{DeviceId, VectorClock};
pub use conflict::{ConflictMarker, MergeStrategy, ResolutionChoice};
pub use messages::{
    ConflictDescriptor, PushChangesRequest, PushChangesResponse, ResolveConflictRequest,
    ResolveConflictResponse,
};
pub use record::VersionedRecord;
