//! # Statebridge Core
//!
//! Pure primitives for the state bridge: entities, snapshots, wire messages,
//! the observable value-holder contract, and the transport abstraction.
//!
//! This crate contains no coordinator logic. It defines the vocabulary both
//! sides of the bridge speak:
//!
//! - [`EntityKey`] / [`RegistrationId`] - the two identifier namespaces
//! - [`Snapshot`] - the (key, revision, value) wire unit for entity state
//! - [`RevisionGate`] - ordering gate applied to every incoming snapshot
//! - [`ValueCell`] - the wrapped observable primitive (get/set/subscribe)
//! - [`Request`] / [`Response`] / [`Push`] - the message surface
//! - [`HubTransport`] / [`PeerTransport`] - the channel contract, with an
//!   in-memory implementation for tests
//!
//! ## Error model
//!
//! [`BridgeError`] carries a stable [`ErrorCode`]; errors crossing the
//! transport travel as [`WireError`] envelopes and are reconstructed on the
//! far side, never thrown raw.

pub mod cell;
pub mod error;
pub mod gate;
pub mod messages;
pub mod transport;
pub mod types;

pub use cell::{ChangeListener, MemoryCell, Subscription, ValueCell};
pub use error::{BridgeError, ErrorCode, ErrorSink, Result};
pub use gate::RevisionGate;
pub use messages::{channel, CallEnvelope, Push, Request, Response, WireError};
pub use transport::{memory::MemoryNetwork, HubEvent, HubTransport, PeerTransport};
pub use types::{EntityKey, PeerId, RegistrationId, Role, Snapshot};

/// Arbitrary structurally-serializable payload carried by entities and RPC.
pub use serde_json::Value;
