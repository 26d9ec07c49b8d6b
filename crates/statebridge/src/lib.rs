//! # Statebridge
//!
//! Replicated shared state and RPC between one privileged process and any
//! number of untrusted peer processes.
//!
//! The privileged side runs a [`Hub`]: it owns every entity's value, stamps
//! each change with a monotonically-increasing revision, and fans snapshots
//! out to connected peers. Peers run a [`Peer`]: each mirrored entity
//! subscribes to broadcasts *before* fetching its initial value, and a
//! per-entity revision gate discards anything stale, so the two paths can
//! race freely without ever rolling state backwards.
//!
//! ```no_run
//! use std::sync::Arc;
//! use statebridge::{Hub, HubConfig, MemoryCell, MemoryNetwork, Peer, PeerConfig, RegistrationQueue};
//! use serde_json::json;
//!
//! # async fn demo() -> statebridge::Result<()> {
//! let (network, transport) = MemoryNetwork::new();
//! let queue = RegistrationQueue::new();
//! let hub = Hub::start(transport, HubConfig::default(), &queue)?;
//!
//! let settings = Arc::new(MemoryCell::new(json!({"theme": "dark"})));
//! hub.register_entity("settings", settings, true)?;
//!
//! let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
//! peer.ready().await?;
//! let mirror = peer.entity("settings", Arc::new(MemoryCell::new(json!(null))));
//! # Ok(())
//! # }
//! ```
//!
//! RPC rides the same transport: the hub registers named method tables, a
//! peer calls them and subscribes to their broadcast events.

mod bridge;

pub use bridge::{Hub, Peer, PeerConfig};

pub use statebridge_core::{
    channel, BridgeError, CallEnvelope, EntityKey, ErrorCode, ErrorSink, HubTransport, MemoryCell,
    MemoryNetwork, PeerId, PeerTransport, Push, RegistrationId, Request, Response, Result,
    RevisionGate, Role, Snapshot, Subscription, Value, ValueCell, WireError,
};
pub use statebridge_hub::{
    HubConfig, HubHandle, MethodTable, RegistrationQueue, RpcHandler, SyncConfig,
};
pub use statebridge_peer::{EntityMirror, MirrorOptions, MirrorPhase, RpcClient, Validator};
