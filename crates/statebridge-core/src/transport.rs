//! Transport abstraction between the privileged hub and its peers.
//!
//! The bridge assumes an at-most-once channel that is reliable and FIFO per
//! direction per peer, with no ordering guarantee across distinct
//! request/response pairs. Timeouts and retries are the transport's
//! responsibility; a hung call suspends its caller indefinitely.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::messages::{Push, Request, Response};
use crate::types::PeerId;

/// Events surfaced to the privileged side by the transport.
#[derive(Debug)]
pub enum HubEvent {
    /// A peer process connected. Broadcasts may now target it.
    PeerConnected(PeerId),
    /// The peer signalled it can receive messages. Fires once per peer.
    PeerReady(PeerId),
    /// The peer disconnected; it must receive no further broadcasts.
    PeerGone(PeerId),
    /// A request/response exchange initiated by a peer.
    Request {
        peer: PeerId,
        request: Request,
        /// Dropping this sender without replying surfaces a transport
        /// failure on the calling side.
        reply: oneshot::Sender<Response>,
    },
}

/// Privileged-side transport endpoint.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Next lifecycle event or incoming request. Returns None once the
    /// transport is closed.
    async fn next_event(&self) -> Option<HubEvent>;

    /// Fire-and-forget delivery of a broadcast to one peer.
    async fn push(&self, peer: PeerId, push: Push) -> Result<()>;
}

/// Peer-side transport endpoint.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Request/response call into the privileged side; suspends until the
    /// response arrives.
    async fn invoke(&self, request: Request) -> Result<Response>;

    /// Next broadcast pushed by the privileged side. Returns None once the
    /// connection is closed.
    async fn next_push(&self) -> Option<Push>;

    /// Signal content-readiness. The hub answers with one snapshot per
    /// registered entity.
    async fn announce_ready(&self) -> Result<()>;

    /// This endpoint's peer id as assigned by the transport.
    fn peer_id(&self) -> PeerId;
}

/// A simple in-memory transport for testing.
///
/// Uses channels to simulate message passing between one hub and any number
/// of peers inside a single process.
pub mod memory {
    use super::*;
    use crate::error::BridgeError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    /// Shared routing state for an in-process hub/peer network.
    pub struct MemoryNetwork {
        events_tx: mpsc::UnboundedSender<HubEvent>,
        pushes: RwLock<HashMap<PeerId, mpsc::UnboundedSender<Push>>>,
        next_peer: AtomicU64,
    }

    impl MemoryNetwork {
        /// Create a network plus the hub endpoint attached to it.
        pub fn new() -> (Arc<Self>, MemoryHubTransport) {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let network = Arc::new(Self {
                events_tx,
                pushes: RwLock::new(HashMap::new()),
                next_peer: AtomicU64::new(1),
            });
            let hub = MemoryHubTransport {
                network: Arc::clone(&network),
                events: Mutex::new(events_rx),
            };
            (network, hub)
        }

        /// Connect a new peer endpoint, surfacing `PeerConnected` at the hub.
        pub async fn connect(self: &Arc<Self>) -> MemoryPeerTransport {
            let id = PeerId::new(self.next_peer.fetch_add(1, Ordering::Relaxed));
            let (push_tx, push_rx) = mpsc::unbounded_channel();
            self.pushes.write().await.insert(id, push_tx);
            let _ = self.events_tx.send(HubEvent::PeerConnected(id));
            MemoryPeerTransport {
                id,
                network: Arc::clone(self),
                pushes: Mutex::new(push_rx),
            }
        }
    }

    /// Hub side of the in-memory network.
    pub struct MemoryHubTransport {
        network: Arc<MemoryNetwork>,
        events: Mutex<mpsc::UnboundedReceiver<HubEvent>>,
    }

    #[async_trait]
    impl HubTransport for MemoryHubTransport {
        async fn next_event(&self) -> Option<HubEvent> {
            self.events.lock().await.recv().await
        }

        async fn push(&self, peer: PeerId, push: Push) -> Result<()> {
            let pushes = self.network.pushes.read().await;
            match pushes.get(&peer) {
                Some(tx) => tx
                    .send(push)
                    .map_err(|_| BridgeError::TransportFailed(format!("{peer} hung up"))),
                None => Err(BridgeError::TransportFailed(format!(
                    "{peer} is not connected"
                ))),
            }
        }
    }

    /// Peer side of the in-memory network.
    pub struct MemoryPeerTransport {
        id: PeerId,
        network: Arc<MemoryNetwork>,
        pushes: Mutex<mpsc::UnboundedReceiver<Push>>,
    }

    impl MemoryPeerTransport {
        /// Simulate window close: removes the push route and surfaces
        /// `PeerGone` at the hub.
        pub async fn disconnect(&self) {
            self.network.pushes.write().await.remove(&self.id);
            let _ = self.network.events_tx.send(HubEvent::PeerGone(self.id));
        }
    }

    #[async_trait]
    impl PeerTransport for MemoryPeerTransport {
        async fn invoke(&self, request: Request) -> Result<Response> {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.network
                .events_tx
                .send(HubEvent::Request {
                    peer: self.id,
                    request,
                    reply: reply_tx,
                })
                .map_err(|_| BridgeError::TransportFailed("hub is gone".into()))?;
            reply_rx
                .await
                .map_err(|_| BridgeError::TransportFailed("request dropped without a response".into()))
        }

        async fn next_push(&self) -> Option<Push> {
            self.pushes.lock().await.recv().await
        }

        async fn announce_ready(&self) -> Result<()> {
            self.network
                .events_tx
                .send(HubEvent::PeerReady(self.id))
                .map_err(|_| BridgeError::TransportFailed("hub is gone".into()))
        }

        fn peer_id(&self) -> PeerId {
            self.id
        }
    }
}
