//! Revision ledger: the authoritative store of entity state.
//!
//! One row per entity: the value holder, the current revision, and the
//! change-notification subscription. The ledger never free-runs a clock; the
//! only path that advances a revision is [`RevisionLedger::bump`], driven by
//! an actual value-holder notification.

use std::collections::HashMap;
use std::sync::Arc;

use statebridge_core::{BridgeError, EntityKey, Result, Snapshot, Subscription, Value, ValueCell};

struct LedgerRow {
    cell: Arc<dyn ValueCell>,
    revision: u64,
    writable: bool,
    /// Held so the subscription outlives the row; released on clear.
    _subscription: Subscription,
}

/// Per-entity monotonic revision counter plus current value.
#[derive(Default)]
pub struct RevisionLedger {
    rows: HashMap<EntityKey, LedgerRow>,
}

impl RevisionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Insert a row at revision 0.
    ///
    /// Returns false if the key is already registered; the existing row and
    /// its subscription are kept (registration is idempotent).
    pub fn register(
        &mut self,
        key: EntityKey,
        cell: Arc<dyn ValueCell>,
        writable: bool,
        subscription: Subscription,
    ) -> bool {
        if self.rows.contains_key(&key) {
            return false;
        }
        self.rows.insert(
            key,
            LedgerRow {
                cell,
                revision: 0,
                writable,
                _subscription: subscription,
            },
        );
        true
    }

    /// Whether a key is registered.
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Current snapshot for a key.
    pub fn snapshot(&self, key: &EntityKey) -> Result<Snapshot> {
        let row = self
            .rows
            .get(key)
            .ok_or_else(|| BridgeError::EntityNotFound { key: key.clone() })?;
        Ok(Snapshot::new(key.clone(), row.revision, row.cell.get()))
    }

    /// Advance the revision by exactly one after an accepted write and
    /// return the snapshot to broadcast.
    pub fn bump(&mut self, key: &EntityKey) -> Result<Snapshot> {
        let row = self
            .rows
            .get_mut(key)
            .ok_or_else(|| BridgeError::EntityNotFound { key: key.clone() })?;
        row.revision += 1;
        Ok(Snapshot::new(key.clone(), row.revision, row.cell.get()))
    }

    /// Delegate a write to the entity's value holder.
    ///
    /// Never broadcasts and never bumps the revision directly; the holder's
    /// change notification drives both, so every observer sees updates
    /// uniformly.
    pub fn set(&self, key: &EntityKey, value: Value) -> Result<()> {
        let row = self
            .rows
            .get(key)
            .ok_or_else(|| BridgeError::EntityNotFound { key: key.clone() })?;
        if !row.writable {
            return Err(BridgeError::WriteForbidden { key: key.clone() });
        }
        row.cell.set(value);
        Ok(())
    }

    /// Snapshots of every registered entity, for the initial full-state
    /// push to a newly-ready peer.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.rows
            .iter()
            .map(|(key, row)| Snapshot::new(key.clone(), row.revision, row.cell.get()))
            .collect()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop every row, releasing each subscription.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
