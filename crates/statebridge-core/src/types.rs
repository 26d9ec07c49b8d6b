//! Strong type definitions for the state bridge.
//!
//! Entity keys and registration ids are newtypes over strings so the two
//! namespaces cannot be mixed up at compile time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Globally-unique key identifying a synchronized entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    /// Create a new entity key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier for a named table of RPC methods.
///
/// Registration ids occupy a separate namespace from entity keys; each must
/// be unique within its own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(String);

impl RegistrationId {
    /// Create a new registration id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RegistrationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RegistrationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier for a connected peer process, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Create from a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// An immutable (key, revision, value) triple: the wire unit for entity
/// state on both the pull and push paths.
///
/// A receiver must never apply a snapshot whose revision is less than or
/// equal to the last revision it already applied for that key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The entity this snapshot belongs to.
    pub key: EntityKey,
    /// Monotonic revision; a given (key, revision) pair denotes exactly one
    /// value for the lifetime of the privileged process.
    pub revision: u64,
    /// The full value (updates never ship deltas).
    pub value: Value,
}

impl Snapshot {
    /// Create a new snapshot.
    pub fn new(key: EntityKey, revision: u64, value: Value) -> Self {
        Self {
            key,
            revision,
            value,
        }
    }
}

/// Which side of the bridge a process plays.
///
/// Resolved explicitly by the embedding application and supplied at
/// construction; the bridge never infers it from ambient runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the revision ledger and the RPC registry.
    Privileged,
    /// Mirrors entities and proxies RPC calls to the privileged side.
    Peer,
}
