//! Top-level entry points: [`Hub`] for the privileged process, [`Peer`] for
//! everyone else.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use statebridge_core::{
    EntityKey, ErrorSink, HubTransport, PeerTransport, RegistrationId, Result, Role, Value,
    ValueCell,
};
use statebridge_hub::{HubConfig, HubHandle, HubService, MethodTable, RegistrationQueue};
use statebridge_peer::{EntityMirror, MirrorOptions, PeerRouter, RpcClient};

/// The privileged side, running its service loop on a spawned task.
pub struct Hub {
    handle: HubHandle,
    task: JoinHandle<()>,
}

impl Hub {
    /// Start the hub over a transport, draining any declarations queued
    /// before startup.
    pub fn start<T: HubTransport + 'static>(
        transport: T,
        config: HubConfig,
        queue: &RegistrationQueue,
    ) -> Result<Self> {
        let service = HubService::new(transport, config, queue)?;
        let handle = service.handle();
        let task = tokio::spawn(service.run());
        debug!("hub started");
        Ok(Self { handle, task })
    }

    /// A cloneable handle for commanding the hub from elsewhere.
    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Which side of the bridge this endpoint is.
    pub fn role(&self) -> Role {
        Role::Privileged
    }

    /// Register an entity. Idempotent per key.
    pub fn register_entity(
        &self,
        key: impl Into<EntityKey>,
        cell: Arc<dyn ValueCell>,
        writable: bool,
    ) -> Result<()> {
        self.handle.register_entity(key.into(), cell, writable)
    }

    /// Register a method table for RPC dispatch.
    pub async fn register_table(&self, table: MethodTable) -> Result<()> {
        self.handle.register_table(table).await
    }

    /// Broadcast an out-of-band event under a registered id.
    pub async fn broadcast(
        &self,
        registration: impl Into<RegistrationId>,
        event: impl Into<String>,
        data: Value,
    ) -> Result<()> {
        self.handle.broadcast(registration.into(), event, data).await
    }

    /// Stop the service loop and wait for it to release its subscriptions.
    pub async fn destroy(self) {
        self.handle.shutdown();
        let _ = self.task.await;
    }
}

/// Peer configuration.
#[derive(Clone, Default)]
pub struct PeerConfig {
    /// Sink for background errors: rejected forwards, failed fetches,
    /// validation rejections.
    pub errors: Option<ErrorSink>,
}

/// The untrusted side: mirrors, RPC clients, and one push router.
pub struct Peer {
    router: PeerRouter,
    errors: Option<ErrorSink>,
}

impl Peer {
    /// Attach to a transport and start routing pushes.
    pub fn connect(transport: Arc<dyn PeerTransport>, config: PeerConfig) -> Self {
        Self {
            router: PeerRouter::start(transport),
            errors: config.errors,
        }
    }

    /// Which side of the bridge this endpoint is.
    pub fn role(&self) -> Role {
        Role::Peer
    }

    /// Announce content-readiness; the hub answers with one snapshot per
    /// registered entity.
    pub async fn ready(&self) -> Result<()> {
        self.router.transport().announce_ready().await
    }

    /// Mirror an entity into a local value holder with default options.
    pub fn entity(&self, key: impl Into<EntityKey>, cell: Arc<dyn ValueCell>) -> EntityMirror {
        self.entity_with(key, cell, MirrorOptions::default())
    }

    /// Mirror an entity with explicit options.
    pub fn entity_with(
        &self,
        key: impl Into<EntityKey>,
        cell: Arc<dyn ValueCell>,
        options: MirrorOptions,
    ) -> EntityMirror {
        EntityMirror::spawn(key.into(), cell, &self.router, options, self.errors.clone())
    }

    /// An RPC client bound to one registration id.
    pub fn rpc(&self, registration: impl Into<RegistrationId>) -> RpcClient {
        RpcClient::new(registration.into(), self.router.clone())
    }

    /// Stop routing. Mirrors and event subscriptions created from this peer
    /// see their channels close.
    pub fn destroy(&self) {
        self.router.close();
    }
}
