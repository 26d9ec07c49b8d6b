//! Helpers for setting up bridge test scenarios.

use std::sync::Arc;

use tokio::task::JoinHandle;

use statebridge_core::transport::memory::{MemoryNetwork, MemoryPeerTransport};
use statebridge_core::{EntityKey, MemoryCell, Value, ValueCell};
use statebridge_hub::{HubConfig, HubHandle, HubService, RegistrationQueue};

/// Let spawned tasks drain their queues without sleeping.
///
/// Everything in the in-memory transport is an unbounded channel, so a fixed
/// number of scheduler yields is enough for any pending hop to complete.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// A running hub over an in-memory network.
pub struct TestHarness {
    network: Arc<MemoryNetwork>,
    hub: HubHandle,
    task: JoinHandle<()>,
}

impl TestHarness {
    /// Start a hub with default configuration and an empty queue.
    pub fn start() -> Self {
        Self::start_with(HubConfig::default(), &RegistrationQueue::new())
    }

    /// Start a hub with explicit configuration and pre-queued declarations.
    pub fn start_with(config: HubConfig, queue: &RegistrationQueue) -> Self {
        let (network, transport) = MemoryNetwork::new();
        let service = HubService::new(transport, config, queue)
            .unwrap_or_else(|err| panic!("harness hub construction failed: {err}"));
        let hub = service.handle();
        let task = tokio::spawn(service.run());
        Self { network, hub, task }
    }

    /// Handle to the running hub.
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Connect a fresh peer endpoint.
    pub async fn connect(&self) -> Arc<MemoryPeerTransport> {
        Arc::new(self.network.connect().await)
    }

    /// Register an entity backed by a fresh in-memory cell and return the
    /// cell for direct manipulation.
    pub fn entity(&self, key: impl Into<EntityKey>, initial: Value) -> Arc<MemoryCell> {
        let cell = Arc::new(MemoryCell::new(initial));
        self.hub
            .register_entity(key.into(), Arc::clone(&cell) as Arc<dyn ValueCell>, true)
            .unwrap_or_else(|err| panic!("harness entity registration failed: {err}"));
        cell
    }

    /// Stop the hub and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.hub.shutdown();
        let _ = self.task.await;
    }
}
