//! Conflict markers and resolution strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Strategy for resolving a field-level three-way conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Keep the local value.
    Local,
    /// Accept the remote value.
    Remote,
    /// Flag for external resolution.
    Manual,
    /// Combine both sides structurally.
    Merge,
}

impl MergeStrategy {
    /// Returns true if this strategy resolves without human input.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, MergeStrategy::Manual)
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Local => f.write_str("local"),
            MergeStrategy::Remote => f.write_str("remote"),
            MergeStrategy::Manual => f.write_str("manual"),
            MergeStrategy::Merge => f.write_str("merge"),
        }
    }
}

/// Side chosen when resolving a server-reported conflict.
///
/// The resolve endpoint only accepts a side; structural merge happens
/// client-side before resubmitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionChoice {
    /// Keep the local version.
    Local,
    /// Accept the server's version.
    Remote,
}

impl fmt::Display for ResolutionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionChoice::Local => f.write_str("local"),
            ResolutionChoice::Remote => f.write_str("remote"),
        }
    }
}

/// A field where base, local, and remote values are pairwise distinct.
///
/// Markers are produced only for genuine three-way conflicts; fields
/// changed on one side merge silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictMarker {
    /// The conflicted field name.
    pub field: String,
    /// The common-ancestor value.
    pub base: Option<Value>,
    /// The local value.
    pub local: Option<Value>,
    /// The remote value.
    pub remote: Option<Value>,
    /// How the conflict was (or should be) resolved.
    pub resolution: MergeStrategy,
}

impl ConflictMarker {
    /// Returns true if the marker still awaits external resolution.
    pub fn needs_manual_resolution(&self) -> bool {
        self.resolution == MergeStrategy::Manual
    }
}
