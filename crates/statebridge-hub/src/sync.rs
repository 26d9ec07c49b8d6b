//! Sync coordinator: ledger ownership, peer tracking, broadcast fan-out.
//!
//! The coordinator is driven by the hub service loop. Value-holder change
//! notifications arrive through an unbounded change feed so cell callbacks
//! stay synchronous; the loop turns each notification into a revision bump
//! plus a snapshot broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use statebridge_core::{
    BridgeError, EntityKey, ErrorSink, HubTransport, PeerId, Push, Result, Snapshot, Value,
    ValueCell,
};

use crate::ledger::RevisionLedger;

/// Sync coordinator configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether `entity-set` requests from peers are honored at all.
    pub allow_peer_writes: bool,
    /// Upper bound on the encoded size of a broadcast snapshot. A value
    /// over the limit aborts that one broadcast; the revision still
    /// advances. `None` broadcasts any size.
    pub max_broadcast_bytes: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allow_peer_writes: true,
            max_broadcast_bytes: None,
        }
    }
}

#[derive(Default)]
struct PeerState {
    /// Set once the peer signals content-ready; gates the single-fire
    /// initial full-state push.
    ready: bool,
}

/// Privileged-side owner of the revision ledger and the peer set.
pub struct SyncCoordinator {
    ledger: RevisionLedger,
    peers: HashMap<PeerId, PeerState>,
    changes_tx: mpsc::UnboundedSender<EntityKey>,
    config: SyncConfig,
    errors: Option<ErrorSink>,
}

impl SyncCoordinator {
    /// Create a coordinator plus the change feed consumed by the service
    /// loop.
    pub fn new(
        config: SyncConfig,
        errors: Option<ErrorSink>,
    ) -> (Self, mpsc::UnboundedReceiver<EntityKey>) {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        (
            Self {
                ledger: RevisionLedger::new(),
                peers: HashMap::new(),
                changes_tx,
                config,
                errors,
            },
            changes_rx,
        )
    }

    /// Register an entity at revision 0 and subscribe to its value holder.
    ///
    /// Idempotent: a key registered twice keeps exactly one ledger row and
    /// one subscription, so no duplicate broadcasts per change.
    pub fn register_entity(&mut self, key: EntityKey, cell: Arc<dyn ValueCell>, writable: bool) {
        if self.ledger.contains(&key) {
            debug!(%key, "entity already registered, ignoring");
            return;
        }

        let feed = self.changes_tx.clone();
        let feed_key = key.clone();
        let subscription = cell.subscribe(Arc::new(move |_| {
            // Queued for the service loop; a closed feed means shutdown.
            let _ = feed.send(feed_key.clone());
        }));

        self.ledger.register(key, cell, writable, subscription);
    }

    /// Current snapshot for a key.
    pub fn get(&self, key: &EntityKey) -> Result<Snapshot> {
        self.ledger.snapshot(key)
    }

    /// Apply a peer write.
    ///
    /// Delegates to the value holder's setter; broadcasting happens on the
    /// subscription path, never here.
    pub fn set(&self, key: &EntityKey, value: Value) -> Result<()> {
        if !self.config.allow_peer_writes {
            return Err(BridgeError::WriteForbidden { key: key.clone() });
        }
        self.ledger.set(key, value)
    }

    /// Handle one change-feed notification: bump the revision, then fan the
    /// snapshot out.
    pub async fn flush_change(&mut self, key: &EntityKey, transport: &dyn HubTransport) {
        // The entity may have been cleared between notification and flush.
        let snapshot = match self.ledger.bump(key) {
            Ok(snapshot) => snapshot,
            Err(_) => return,
        };

        if let Some(limit) = self.config.max_broadcast_bytes {
            let encoded = serde_json::to_vec(&snapshot.value)
                .map(|bytes| bytes.len())
                .unwrap_or(usize::MAX);
            if encoded > limit {
                // Policy: the revision stays advanced and the broadcast is
                // not retried; the ledger always reflects local state.
                self.report(BridgeError::SerializationFailed {
                    key: key.clone(),
                    reason: format!("{encoded} encoded bytes over the {limit} byte limit"),
                });
                return;
            }
        }

        self.broadcast(Push::EntityUpdate(snapshot), transport).await;
    }

    /// Fan a push out to every connected peer.
    ///
    /// Per-peer failures never abort delivery to the rest; a failed send is
    /// treated as an implicit disconnect of that peer.
    pub async fn broadcast(&mut self, push: Push, transport: &dyn HubTransport) {
        let targets: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in targets {
            if let Err(err) = transport.push(peer, push.clone()).await {
                warn!(%peer, error = %err, "push failed, dropping peer");
                self.peers.remove(&peer);
            }
        }
    }

    /// Track a newly-connected peer.
    pub fn peer_connected(&mut self, peer: PeerId) {
        debug!(%peer, "peer connected");
        self.peers.entry(peer).or_default();
    }

    /// Handle the peer's content-ready signal: push one snapshot per
    /// registered entity, exactly once per peer, so late joiners are not
    /// starved.
    pub async fn peer_ready(&mut self, peer: PeerId, transport: &dyn HubTransport) {
        let state = self.peers.entry(peer).or_default();
        if state.ready {
            debug!(%peer, "duplicate ready signal, ignoring");
            return;
        }
        state.ready = true;

        for snapshot in self.ledger.snapshots() {
            if let Err(err) = transport.push(peer, Push::EntityUpdate(snapshot)).await {
                warn!(%peer, error = %err, "initial push failed, dropping peer");
                self.peers.remove(&peer);
                return;
            }
        }
    }

    /// Remove a disconnected peer. Subsequent broadcasts skip it.
    pub fn peer_gone(&mut self, peer: PeerId) {
        if self.peers.remove(&peer).is_some() {
            debug!(%peer, "peer disconnected");
        }
    }

    /// Route an error with no synchronous caller.
    pub fn report(&self, err: BridgeError) {
        match &self.errors {
            Some(sink) => sink(err),
            None => warn!(error = %err, "unreported bridge error"),
        }
    }

    /// Number of tracked peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Number of registered entities.
    pub fn entity_count(&self) -> usize {
        self.ledger.len()
    }

    /// Release every subscription and forget all peers.
    ///
    /// Safe with zero registered entities and safe to call multiple times.
    pub fn shutdown(&mut self) {
        self.ledger.clear();
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statebridge_core::transport::memory::MemoryNetwork;
    use statebridge_core::{HubEvent, MemoryCell, PeerTransport};

    fn coordinator(config: SyncConfig) -> (SyncCoordinator, mpsc::UnboundedReceiver<EntityKey>) {
        SyncCoordinator::new(config, None)
    }

    #[tokio::test]
    async fn test_change_notification_bumps_and_broadcasts() {
        let (network, hub_transport) = MemoryNetwork::new();
        let peer = network.connect().await;
        let (mut sync, mut changes) = coordinator(SyncConfig::default());

        // Drain the connect event and track the peer.
        match hub_transport.next_event().await {
            Some(HubEvent::PeerConnected(id)) => sync.peer_connected(id),
            other => panic!("expected PeerConnected, got {other:?}"),
        }

        let cell = Arc::new(MemoryCell::new(json!(0)));
        sync.register_entity(EntityKey::new("counter"), cell.clone(), true);

        cell.set(json!(1));
        let key = changes.recv().await.unwrap();
        sync.flush_change(&key, &hub_transport).await;

        match peer.next_push().await {
            Some(Push::EntityUpdate(snapshot)) => {
                assert_eq!(snapshot.revision, 1);
                assert_eq!(snapshot.value, json!(1));
            }
            other => panic!("expected EntityUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_one_subscription() {
        let (_network, hub_transport) = MemoryNetwork::new();
        let (mut sync, mut changes) = coordinator(SyncConfig::default());

        let cell = Arc::new(MemoryCell::new(json!(0)));
        sync.register_entity(EntityKey::new("k"), cell.clone(), true);
        sync.register_entity(EntityKey::new("k"), cell.clone(), true);

        assert_eq!(cell.listener_count(), 1);
        assert_eq!(sync.entity_count(), 1);

        // One set, one feed entry, revision 1 not 2.
        cell.set(json!(1));
        let key = changes.recv().await.unwrap();
        sync.flush_change(&key, &hub_transport).await;
        assert!(changes.try_recv().is_err());
        assert_eq!(sync.get(&EntityKey::new("k")).unwrap().revision, 1);
    }

    #[tokio::test]
    async fn test_peer_write_forbidden_leaves_ledger_untouched() {
        let (mut sync, _changes) = coordinator(SyncConfig {
            allow_peer_writes: false,
            ..SyncConfig::default()
        });
        let key = EntityKey::new("k");
        sync.register_entity(key.clone(), Arc::new(MemoryCell::new(json!(7))), true);

        match sync.set(&key, json!(8)) {
            Err(BridgeError::WriteForbidden { .. }) => {}
            other => panic!("expected WriteForbidden, got {other:?}"),
        }

        let snapshot = sync.get(&key).unwrap();
        assert_eq!(snapshot.value, json!(7));
        assert_eq!(snapshot.revision, 0);
    }

    #[tokio::test]
    async fn test_set_unknown_key_is_entity_not_found() {
        let (sync, _changes) = coordinator(SyncConfig::default());
        match sync.set(&EntityKey::new("ghost"), json!(1)) {
            Err(BridgeError::EntityNotFound { .. }) => {}
            other => panic!("expected EntityNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ready_pushes_full_state_exactly_once() {
        let (network, hub_transport) = MemoryNetwork::new();
        let peer = network.connect().await;
        let (mut sync, _changes) = coordinator(SyncConfig::default());

        sync.register_entity(EntityKey::new("a"), Arc::new(MemoryCell::new(json!(1))), true);
        sync.register_entity(EntityKey::new("b"), Arc::new(MemoryCell::new(json!(2))), true);

        let id = peer.peer_id();
        sync.peer_connected(id);
        sync.peer_ready(id, &hub_transport).await;
        sync.peer_ready(id, &hub_transport).await; // single-fire

        let mut received = Vec::new();
        for _ in 0..2 {
            match peer.next_push().await {
                Some(Push::EntityUpdate(snapshot)) => received.push(snapshot.key),
                other => panic!("expected EntityUpdate, got {other:?}"),
            }
        }
        received.sort();
        assert_eq!(received, vec![EntityKey::new("a"), EntityKey::new("b")]);

        // No third push from the duplicate ready signal.
        let extra = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            peer.next_push(),
        )
        .await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_gone_peer_receives_no_broadcasts() {
        let (network, hub_transport) = MemoryNetwork::new();
        let peer = network.connect().await;
        let (mut sync, mut changes) = coordinator(SyncConfig::default());

        let id = peer.peer_id();
        sync.peer_connected(id);

        let cell = Arc::new(MemoryCell::new(json!(0)));
        sync.register_entity(EntityKey::new("k"), cell.clone(), true);

        sync.peer_gone(id);
        assert_eq!(sync.peer_count(), 0);

        cell.set(json!(1));
        let key = changes.recv().await.unwrap();
        sync.flush_change(&key, &hub_transport).await;

        let extra = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            peer.next_push(),
        )
        .await;
        assert!(extra.is_err());
    }

    #[tokio::test]
    async fn test_failed_push_drops_peer_but_not_fanout() {
        let (network, hub_transport) = MemoryNetwork::new();
        let dead = network.connect().await;
        let alive = network.connect().await;
        let (mut sync, mut changes) = coordinator(SyncConfig::default());

        sync.peer_connected(dead.peer_id());
        sync.peer_connected(alive.peer_id());
        dead.disconnect().await;

        let cell = Arc::new(MemoryCell::new(json!(0)));
        sync.register_entity(EntityKey::new("k"), cell.clone(), true);
        cell.set(json!(1));
        let key = changes.recv().await.unwrap();
        sync.flush_change(&key, &hub_transport).await;

        // The live peer still got the update, the dead one was pruned.
        match alive.next_push().await {
            Some(Push::EntityUpdate(snapshot)) => assert_eq!(snapshot.value, json!(1)),
            other => panic!("expected EntityUpdate, got {other:?}"),
        }
        assert_eq!(sync.peer_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_value_skips_broadcast_but_keeps_revision() {
        let (network, hub_transport) = MemoryNetwork::new();
        let peer = network.connect().await;

        let reported = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&reported);
        let (mut sync, mut changes) = SyncCoordinator::new(
            SyncConfig {
                allow_peer_writes: true,
                max_broadcast_bytes: Some(32),
            },
            Some(Arc::new(move |err| sink_log.lock().unwrap().push(err))),
        );
        sync.peer_connected(peer.peer_id());

        let cell = Arc::new(MemoryCell::new(json!("small")));
        sync.register_entity(EntityKey::new("blob"), cell.clone(), true);

        cell.set(json!("x".repeat(64)));
        let key = changes.recv().await.unwrap();
        sync.flush_change(&key, &hub_transport).await;

        // The revision advanced but nothing went out.
        assert_eq!(sync.get(&key).unwrap().revision, 1);
        let extra = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            peer.next_push(),
        )
        .await;
        assert!(extra.is_err());
        match reported.lock().unwrap().as_slice() {
            [BridgeError::SerializationFailed { key, .. }] => {
                assert_eq!(key.as_str(), "blob");
            }
            other => panic!("expected one SerializationFailed, got {other:?}"),
        }

        // The next in-bounds write broadcasts at the next revision.
        cell.set(json!("ok"));
        let key = changes.recv().await.unwrap();
        sync.flush_change(&key, &hub_transport).await;
        match peer.next_push().await {
            Some(Push::EntityUpdate(snapshot)) => {
                assert_eq!(snapshot.revision, 2);
                assert_eq!(snapshot.value, json!("ok"));
            }
            other => panic!("expected EntityUpdate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_subscriptions() {
        let (mut sync, _changes) = coordinator(SyncConfig::default());
        let cell = Arc::new(MemoryCell::new(json!(0)));
        sync.register_entity(EntityKey::new("k"), cell.clone(), true);
        assert_eq!(cell.listener_count(), 1);

        sync.shutdown();
        assert_eq!(cell.listener_count(), 0);
        assert_eq!(sync.entity_count(), 0);

        // Idempotent, and safe with nothing registered.
        sync.shutdown();
    }
}
