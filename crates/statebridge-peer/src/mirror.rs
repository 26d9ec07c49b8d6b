//! Entity mirror: a peer-local replica of one privileged-side entity.
//!
//! Convergence relies on two rules. First, the watcher is registered before
//! the initial fetch is sent, so no broadcast can slip between them. Second,
//! every snapshot from either path runs through one [`RevisionGate`], so a
//! stale fetch response that loses the race against a broadcast is
//! discarded instead of overwriting newer state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use statebridge_core::{
    BridgeError, EntityKey, ErrorSink, PeerTransport, Request, Response, Result, RevisionGate,
    Snapshot, Subscription, Value, ValueCell,
};

use crate::router::PeerRouter;

/// Caller-supplied check applied to outbound local writes.
pub type Validator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Mirror lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPhase {
    /// Created, apply task not yet started.
    Uninitialized,
    /// Watching broadcasts; the initial fetch has not settled.
    Syncing,
    /// At least one snapshot applied, or the fetch settled without one.
    Live,
}

/// Per-mirror configuration.
#[derive(Clone, Default)]
pub struct MirrorOptions {
    /// Refuse local writes entirely when false.
    pub read_only: bool,
    /// Validator run against every outbound write before it leaves the
    /// process. Rejections are reported, not sent.
    pub validate: Option<Validator>,
}

struct MirrorShared {
    key: EntityKey,
    cell: Arc<dyn ValueCell>,
    gate: Mutex<RevisionGate>,
    phase: Mutex<MirrorPhase>,
    /// True while a remote snapshot is being written into the cell, so the
    /// local subscription does not echo it back to the hub.
    applying_remote: AtomicBool,
    /// Local writes are dropped until the first snapshot is accepted or the
    /// initial fetch settles, so a peer cannot clobber hub state it has
    /// never seen.
    outbound_ready: AtomicBool,
    errors: Option<ErrorSink>,
}

impl MirrorShared {
    fn apply(&self, snapshot: Snapshot) {
        if !self.gate.lock().unwrap().admit(snapshot.revision) {
            debug!(key = %self.key, revision = snapshot.revision, "stale snapshot discarded");
            return;
        }
        self.applying_remote.store(true, Ordering::SeqCst);
        self.cell.set(snapshot.value);
        self.applying_remote.store(false, Ordering::SeqCst);
        self.outbound_ready.store(true, Ordering::SeqCst);
        *self.phase.lock().unwrap() = MirrorPhase::Live;
    }

    fn report(&self, err: BridgeError) {
        match &self.errors {
            Some(sink) => sink(err),
            None => warn!(key = %self.key, error = %err, "unreported mirror error"),
        }
    }
}

/// Peer-side replica of one entity.
///
/// Detaches on drop; a detached mirror keeps its last value but stops
/// receiving broadcasts and forwarding writes.
pub struct EntityMirror {
    shared: Arc<MirrorShared>,
    router: PeerRouter,
    read_only: bool,
    subscription: Mutex<Option<Subscription>>,
}

impl EntityMirror {
    /// Start mirroring `key` into `cell`.
    ///
    /// Registers a broadcast watcher, then issues the initial fetch from a
    /// background task; the mirror is usable immediately and converges once
    /// either path delivers a snapshot.
    pub fn spawn(
        key: EntityKey,
        cell: Arc<dyn ValueCell>,
        router: &PeerRouter,
        options: MirrorOptions,
        errors: Option<ErrorSink>,
    ) -> Self {
        let shared = Arc::new(MirrorShared {
            key: key.clone(),
            cell: Arc::clone(&cell),
            gate: Mutex::new(RevisionGate::new()),
            phase: Mutex::new(MirrorPhase::Uninitialized),
            applying_remote: AtomicBool::new(false),
            outbound_ready: AtomicBool::new(false),
            errors,
        });

        // Outbound writer: forwards accepted local writes, best-effort.
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
        {
            let shared = Arc::clone(&shared);
            let transport = router.transport();
            tokio::spawn(async move {
                while let Some(value) = outbound_rx.recv().await {
                    let request = Request::EntitySet {
                        key: shared.key.clone(),
                        value,
                    };
                    match transport.invoke(request).await {
                        Ok(Response::Ack) => {}
                        Ok(Response::Err(wire)) => shared.report(wire.into()),
                        Ok(other) => shared.report(BridgeError::TransportFailed(format!(
                            "unexpected response to entity-set: {other:?}"
                        ))),
                        Err(err) => shared.report(err),
                    }
                }
            });
        }

        let subscription = {
            let shared = Arc::clone(&shared);
            let read_only = options.read_only;
            let validate = options.validate.clone();
            cell.subscribe(Arc::new(move |value| {
                if shared.applying_remote.load(Ordering::SeqCst) {
                    return;
                }
                if read_only || !shared.outbound_ready.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(validate) = &validate {
                    if let Err(reason) = validate(value) {
                        shared.report(BridgeError::ValidationFailed {
                            key: shared.key.clone(),
                            reason,
                        });
                        return;
                    }
                }
                // Closed channel means the mirror is detaching.
                let _ = outbound_tx.send(value.clone());
            }))
        };

        // Watch before fetching, so nothing can land in between.
        let watcher = router.watch_entity(key);
        {
            let shared = Arc::clone(&shared);
            let transport = router.transport();
            tokio::spawn(apply_loop(shared, transport, watcher));
        }

        Self {
            shared,
            router: router.clone(),
            read_only: options.read_only,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// The mirrored entity key.
    pub fn key(&self) -> &EntityKey {
        &self.shared.key
    }

    /// Current local value.
    pub fn get(&self) -> Value {
        self.shared.cell.get()
    }

    /// Write locally and forward to the privileged side.
    ///
    /// The forward is asynchronous and best-effort; a rejection surfaces
    /// through the error sink, not here.
    pub fn set(&self, value: Value) -> Result<()> {
        if self.read_only {
            return Err(BridgeError::WriteForbidden {
                key: self.shared.key.clone(),
            });
        }
        self.shared.cell.set(value);
        Ok(())
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> MirrorPhase {
        *self.shared.phase.lock().unwrap()
    }

    /// Revision of the last applied snapshot, if any.
    pub fn last_revision(&self) -> Option<u64> {
        self.shared.gate.lock().unwrap().last_applied()
    }

    /// Stop mirroring. Idempotent; the local value stays as-is.
    pub fn detach(&self) {
        // Dropping the subscription releases the cell listener, which drops
        // the outbound channel and ends the writer task.
        drop(self.subscription.lock().unwrap().take());
        self.router.unwatch_entity(&self.shared.key);
    }
}

impl Drop for EntityMirror {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn apply_loop(
    shared: Arc<MirrorShared>,
    transport: Arc<dyn PeerTransport>,
    mut watcher: mpsc::UnboundedReceiver<Snapshot>,
) {
    *shared.phase.lock().unwrap() = MirrorPhase::Syncing;
    let fetch = transport.invoke(Request::EntityGet {
        key: shared.key.clone(),
    });
    tokio::pin!(fetch);
    let mut fetched = false;

    // Broadcasts are applied even while the fetch is still in flight; the
    // gate decides which side wins.
    loop {
        tokio::select! {
            outcome = &mut fetch, if !fetched => {
                fetched = true;
                match outcome {
                    Ok(Response::Snapshot(snapshot)) => shared.apply(snapshot),
                    Ok(Response::Err(wire)) => shared.report(wire.into()),
                    Ok(other) => shared.report(BridgeError::TransportFailed(format!(
                        "unexpected response to entity-get: {other:?}"
                    ))),
                    Err(err) => shared.report(err),
                }
                // The fetch settled one way or the other; local writes may
                // flow even if it produced nothing.
                shared.outbound_ready.store(true, Ordering::SeqCst);
                *shared.phase.lock().unwrap() = MirrorPhase::Live;
            }
            snapshot = watcher.recv() => match snapshot {
                Some(snapshot) => shared.apply(snapshot),
                None => break,
            }
        }
    }
}
