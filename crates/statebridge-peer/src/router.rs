//! Push routing on the peer side.
//!
//! One pump task reads broadcasts off the transport and routes them:
//! entity updates go to at most one watcher per key, RPC events go to every
//! subscriber of the exact (registration, event) pair. Unmatched pushes are
//! logged and dropped; broadcasts are fire-and-forget by contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use statebridge_core::{EntityKey, PeerTransport, Push, RegistrationId, Snapshot, Value};

#[derive(Default)]
struct Routes {
    entities: HashMap<EntityKey, mpsc::UnboundedSender<Snapshot>>,
    events: HashMap<(RegistrationId, String), Vec<mpsc::UnboundedSender<Value>>>,
}

/// Cheaply cloneable router over one peer transport.
#[derive(Clone)]
pub struct PeerRouter {
    transport: Arc<dyn PeerTransport>,
    routes: Arc<Mutex<Routes>>,
    pump: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PeerRouter {
    /// Start routing pushes from the transport.
    pub fn start(transport: Arc<dyn PeerTransport>) -> Self {
        let routes = Arc::new(Mutex::new(Routes::default()));
        let pump = {
            let transport = Arc::clone(&transport);
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                while let Some(push) = transport.next_push().await {
                    route(&routes, push);
                }
                debug!("push stream ended, router pump stopping");
            })
        };
        Self {
            transport,
            routes,
            pump: Arc::new(Mutex::new(Some(pump))),
        }
    }

    /// The transport this router pumps.
    pub fn transport(&self) -> Arc<dyn PeerTransport> {
        Arc::clone(&self.transport)
    }

    /// Watch snapshot broadcasts for one key.
    ///
    /// A key has at most one watcher; watching again replaces the previous
    /// receiver.
    pub fn watch_entity(&self, key: EntityKey) -> mpsc::UnboundedReceiver<Snapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().unwrap().entities.insert(key, tx);
        rx
    }

    /// Stop routing snapshots for a key. Safe when nothing is watching.
    pub fn unwatch_entity(&self, key: &EntityKey) {
        self.routes.lock().unwrap().entities.remove(key);
    }

    /// Subscribe to RPC events matching the exact (registration, event)
    /// pair. Multiple subscribers per pair each receive every event.
    pub fn subscribe_event(
        &self,
        registration: RegistrationId,
        event: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes
            .lock()
            .unwrap()
            .events
            .entry((registration, event.into()))
            .or_default()
            .push(tx);
        rx
    }

    /// Stop the pump and drop every route. Idempotent; receivers handed out
    /// earlier see their channels close.
    pub fn close(&self) {
        if let Some(pump) = self.pump.lock().unwrap().take() {
            pump.abort();
        }
        let mut routes = self.routes.lock().unwrap();
        routes.entities.clear();
        routes.events.clear();
    }
}

fn route(routes: &Mutex<Routes>, push: Push) {
    let channel = push.channel();
    let mut routes = routes.lock().unwrap();
    match push {
        Push::EntityUpdate(snapshot) => {
            match routes.entities.get(&snapshot.key) {
                Some(tx) => {
                    if tx.send(snapshot.clone()).is_err() {
                        routes.entities.remove(&snapshot.key);
                    }
                }
                None => debug!(channel, key = %snapshot.key, "no watcher, dropping push"),
            }
        }
        Push::RpcEvent {
            registration,
            event,
            data,
        } => {
            let pair = (registration, event);
            match routes.events.get_mut(&pair) {
                Some(subscribers) => subscribers.retain(|tx| tx.send(data.clone()).is_ok()),
                None => {
                    debug!(channel, registration = %pair.0, event = %pair.1, "no subscriber, dropping push");
                }
            }
        }
    }
}
