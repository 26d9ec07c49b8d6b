//! Deferred registration buffer.
//!
//! Entity and method-table declarations may run in any order relative to hub
//! startup. Declaration sites share a clone of [`RegistrationQueue`]; the
//! hub service drains it exactly once at construction. This is an explicit,
//! passed-in context object, not process-wide state.

use std::sync::{Arc, Mutex};

use statebridge_core::{BridgeError, EntityKey, Result, ValueCell};

use crate::rpc::MethodTable;

/// Pending declarations, drained exactly once at service startup.
#[derive(Clone, Default)]
pub struct RegistrationQueue {
    inner: Arc<Mutex<QueueInner>>,
}

#[derive(Default)]
struct QueueInner {
    entities: Vec<(EntityKey, Arc<dyn ValueCell>)>,
    tables: Vec<MethodTable>,
    drained: bool,
}

impl RegistrationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entity declaration.
    ///
    /// Re-declaring a key replaces the value holder in its original slot;
    /// registration downstream is idempotent anyway. Fails with
    /// `AlreadyInitialized` once the queue has been drained.
    pub fn enqueue_entity(&self, key: EntityKey, cell: Arc<dyn ValueCell>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.drained {
            return Err(BridgeError::AlreadyInitialized(format!(
                "registration queue already drained, register {key} on the hub directly"
            )));
        }
        if let Some(slot) = inner.entities.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = cell;
        } else {
            inner.entities.push((key, cell));
        }
        Ok(())
    }

    /// Queue a method-table declaration. Re-declaring a registration id
    /// replaces the table in its original slot.
    pub fn enqueue_table(&self, table: MethodTable) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.drained {
            return Err(BridgeError::AlreadyInitialized(format!(
                "registration queue already drained, register {} on the hub directly",
                table.registration()
            )));
        }
        if let Some(slot) = inner
            .tables
            .iter_mut()
            .find(|t| t.registration() == table.registration())
        {
            *slot = table;
        } else {
            inner.tables.push(table);
        }
        Ok(())
    }

    /// Drain everything in insertion order and clear the queue atomically.
    ///
    /// A second drain yields nothing, so initialization happens at most once
    /// per key regardless of declaration order.
    pub(crate) fn drain(&self) -> (Vec<(EntityKey, Arc<dyn ValueCell>)>, Vec<MethodTable>) {
        let mut inner = self.inner.lock().unwrap();
        inner.drained = true;
        (
            std::mem::take(&mut inner.entities),
            std::mem::take(&mut inner.tables),
        )
    }

    /// Whether the queue has been drained.
    pub fn is_drained(&self) -> bool {
        self.inner.lock().unwrap().drained
    }
}
