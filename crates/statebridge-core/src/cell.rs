//! Observable value holder: the primitive the bridge wraps.
//!
//! The bridge does not reimplement observability; it consumes any holder
//! satisfying the [`ValueCell`] contract. [`MemoryCell`] is the reference
//! implementation used in tests and as a convenience default.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

/// Listener invoked on every value change.
///
/// Listeners fire synchronously on the writer's thread and must not call
/// back into the cell's setter.
pub type ChangeListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Contract for the wrapped observable primitive: get / set / subscribe.
pub trait ValueCell: Send + Sync {
    /// Current value.
    fn get(&self) -> Value;

    /// Replace the value, notifying every listener.
    fn set(&self, value: Value);

    /// Register a change listener. The returned handle unsubscribes when
    /// cancelled or dropped.
    fn subscribe(&self, listener: ChangeListener) -> Subscription;
}

/// Handle to an active change subscription.
///
/// Unsubscribes exactly once, either explicitly via [`Subscription::cancel`]
/// or on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a cancellation closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that releases nothing.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Release the subscription. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// In-memory observable value holder.
///
/// Clones share the same underlying value and listener set. Listeners fire
/// on every `set`, even if the new value equals the old one.
#[derive(Clone)]
pub struct MemoryCell {
    inner: Arc<CellInner>,
}

struct CellInner {
    value: Mutex<Value>,
    listeners: Mutex<HashMap<u64, ChangeListener>>,
    next_listener: AtomicU64,
}

impl MemoryCell {
    /// Create a cell holding the given initial value.
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: Mutex::new(initial),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }
}

impl Default for MemoryCell {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl ValueCell for MemoryCell {
    fn get(&self) -> Value {
        self.inner.value.lock().unwrap().clone()
    }

    fn set(&self, value: Value) {
        *self.inner.value.lock().unwrap() = value.clone();

        // Snapshot the listener set so callbacks run outside both locks.
        let listeners: Vec<ChangeListener> = {
            let guard = self.inner.listeners.lock().unwrap();
            guard.values().cloned().collect()
        };
        for listener in listeners {
            listener(&value);
        }
    }

    fn subscribe(&self, listener: ChangeListener) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().unwrap().insert(id, listener);

        let weak: Weak<CellInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().unwrap().remove(&id);
            }
        })
    }
}
