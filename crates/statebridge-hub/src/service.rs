//! Hub service: the single task driving the privileged side.
//!
//! Owns the sync coordinator, the RPC registry, and the transport, and
//! multiplexes three inputs: transport events, the value-holder change feed,
//! and commands from [`HubHandle`] clones. Everything that mutates the
//! ledger or the peer set happens on this task.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use statebridge_core::{
    BridgeError, CallEnvelope, EntityKey, ErrorSink, HubEvent, HubTransport, Push, RegistrationId,
    Request, Response, Result, Value, ValueCell,
};

use crate::pending::RegistrationQueue;
use crate::rpc::{MethodTable, RpcCoordinator};
use crate::sync::{SyncConfig, SyncCoordinator};

/// Hub service configuration.
#[derive(Default)]
pub struct HubConfig {
    pub sync: SyncConfig,
    /// Sink for errors with no synchronous caller. Defaults to a warning
    /// log entry.
    pub errors: Option<ErrorSink>,
}

enum HubCommand {
    RegisterEntity {
        key: EntityKey,
        cell: Arc<dyn ValueCell>,
        writable: bool,
    },
    RegisterTable {
        table: MethodTable,
        reply: oneshot::Sender<Result<()>>,
    },
    Broadcast {
        registration: RegistrationId,
        event: String,
        data: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Cloneable handle for talking to a running hub service.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn gone() -> BridgeError {
        BridgeError::TransportFailed("hub service is not running".into())
    }

    /// Register an entity on the running hub. Idempotent per key.
    pub fn register_entity(
        &self,
        key: EntityKey,
        cell: Arc<dyn ValueCell>,
        writable: bool,
    ) -> Result<()> {
        self.commands
            .send(HubCommand::RegisterEntity {
                key,
                cell,
                writable,
            })
            .map_err(|_| Self::gone())
    }

    /// Register a method table on the running hub. Fails if the
    /// registration id is already taken.
    pub async fn register_table(&self, table: MethodTable) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::RegisterTable {
                table,
                reply: reply_tx,
            })
            .map_err(|_| Self::gone())?;
        reply_rx.await.map_err(|_| Self::gone())?
    }

    /// Broadcast an out-of-band event to every connected peer.
    ///
    /// The registration id must belong to a registered method table.
    pub async fn broadcast(
        &self,
        registration: RegistrationId,
        event: impl Into<String>,
        data: Value,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Broadcast {
                registration,
                event: event.into(),
                data,
                reply: reply_tx,
            })
            .map_err(|_| Self::gone())?;
        reply_rx.await.map_err(|_| Self::gone())?
    }

    /// Ask the service loop to stop. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown);
    }
}

/// The privileged-side service task.
pub struct HubService<T: HubTransport> {
    transport: T,
    sync: SyncCoordinator,
    rpc: RpcCoordinator,
    changes: mpsc::UnboundedReceiver<EntityKey>,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    handle: HubHandle,
}

impl<T: HubTransport> HubService<T> {
    /// Build a service, draining every deferred declaration from the queue.
    ///
    /// The queue is drained exactly once; duplicate method tables queued
    /// before startup surface here as `AlreadyInitialized`.
    pub fn new(transport: T, config: HubConfig, queue: &RegistrationQueue) -> Result<Self> {
        let (sync, changes) = SyncCoordinator::new(config.sync, config.errors);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let mut service = Self {
            transport,
            sync,
            rpc: RpcCoordinator::new(),
            changes,
            commands: commands_rx,
            handle: HubHandle {
                commands: commands_tx,
            },
        };

        let (entities, tables) = queue.drain();
        for (key, cell) in entities {
            service.sync.register_entity(key, cell, true);
        }
        for table in tables {
            service.rpc.register(table)?;
        }
        Ok(service)
    }

    /// A handle for commanding the service once [`run`](Self::run) is
    /// spawned.
    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    /// Drive the service until the transport closes or a shutdown command
    /// arrives. Releases every subscription on the way out.
    pub async fn run(mut self) {
        loop {
            let flow = tokio::select! {
                event = self.transport.next_event() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("transport closed, stopping hub service");
                        ControlFlow::Break(())
                    }
                },
                Some(key) = self.changes.recv() => {
                    self.sync.flush_change(&key, &self.transport).await;
                    ControlFlow::Continue(())
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle dropped; keep serving connected peers.
                    None => ControlFlow::Continue(()),
                }
            };
            if flow.is_break() {
                break;
            }
        }
        self.sync.shutdown();
    }

    async fn handle_event(&mut self, event: HubEvent) -> ControlFlow<()> {
        match event {
            HubEvent::PeerConnected(peer) => self.sync.peer_connected(peer),
            HubEvent::PeerReady(peer) => self.sync.peer_ready(peer, &self.transport).await,
            HubEvent::PeerGone(peer) => self.sync.peer_gone(peer),
            HubEvent::Request {
                peer,
                request,
                reply,
            } => {
                debug!(%peer, channel = request.channel(), "handling request");
                match request {
                    // Handler bodies may suspend; they run on their own task
                    // so calls in flight never stall the loop or each other.
                    Request::RpcCall {
                        registration,
                        method,
                        args,
                    } => match self.rpc.prepare(&registration, &method) {
                        Ok(call) => {
                            tokio::spawn(async move {
                                let _ = reply.send(Response::Call(call.run(args).await));
                            });
                        }
                        Err(err) => {
                            let _ = reply.send(Response::Call(CallEnvelope::err(err)));
                        }
                    },
                    other => {
                        let response = self.handle_request(other);
                        if reply.send(response).is_err() {
                            warn!(%peer, "peer gave up waiting for a response");
                        }
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::EntityGet { key } => match self.sync.get(&key) {
                Ok(snapshot) => Response::Snapshot(snapshot),
                Err(err) => Response::Err(err.into()),
            },
            Request::EntitySet { key, value } => match self.sync.set(&key, value) {
                Ok(()) => Response::Ack,
                Err(err) => Response::Err(err.into()),
            },
            // Handled on its own task before reaching here.
            Request::RpcCall { .. } => unreachable!("rpc calls are spawned"),
        }
    }

    async fn handle_command(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::RegisterEntity {
                key,
                cell,
                writable,
            } => self.sync.register_entity(key, cell, writable),
            HubCommand::RegisterTable { table, reply } => {
                let _ = reply.send(self.rpc.register(table));
            }
            HubCommand::Broadcast {
                registration,
                event,
                data,
                reply,
            } => {
                let outcome = if self.rpc.contains(&registration) {
                    self.sync
                        .broadcast(
                            Push::RpcEvent {
                                registration,
                                event,
                                data,
                            },
                            &self.transport,
                        )
                        .await;
                    Ok(())
                } else {
                    Err(BridgeError::ServiceNotFound { registration })
                };
                let _ = reply.send(outcome);
            }
            HubCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }
}
