//! RPC registry: named method tables, dispatch, and table-wide hooks.
//!
//! A call moves through: Dispatched → (before hook) → Executing →
//! (after hook) → Resolved | Rejected. Missing registrations and missing
//! methods are terminal and resolved before any hook runs.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use statebridge_core::{BridgeError, CallEnvelope, RegistrationId, Result, Value};

/// Asynchronous RPC method handler.
///
/// Handlers may suspend internally; concurrent calls to the same
/// registration are not serialized unless the handler imposes that itself.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Execute the method with positional arguments.
    async fn call(&self, args: Vec<Value>) -> Result<Value>;
}

/// Adapter so plain async closures can serve as handlers.
struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RpcHandler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value> {
        (self.f)(args).await
    }
}

/// Hook run before every method call in a table. Erroring aborts the call.
pub type BeforeHook = Arc<dyn Fn(&str, &[Value]) -> Result<()> + Send + Sync>;

/// Hook run after every method call in a table, success or not.
///
/// Receives the method name, the wall-clock duration from dispatch to
/// settle, and the result (None when the call failed).
pub type AfterHook = Arc<dyn Fn(&str, Duration, Option<&Value>) + Send + Sync>;

/// A named table of RPC handlers with optional table-wide hooks.
pub struct MethodTable {
    registration: RegistrationId,
    methods: BTreeMap<String, Arc<dyn RpcHandler>>,
    before: Option<BeforeHook>,
    after: Option<AfterHook>,
}

impl MethodTable {
    /// Start an empty table for a registration id.
    pub fn new(registration: impl Into<RegistrationId>) -> Self {
        Self {
            registration: registration.into(),
            methods: BTreeMap::new(),
            before: None,
            after: None,
        }
    }

    /// Add a boxed handler.
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn RpcHandler>) -> Self {
        self.methods.insert(name.into(), handler);
        self
    }

    /// Add an async closure as a handler.
    pub fn method<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handler(name, Arc::new(FnHandler { f }))
    }

    /// Set the before hook, invoked for every method call in this table.
    pub fn before(
        mut self,
        hook: impl Fn(&str, &[Value]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(hook));
        self
    }

    /// Set the after hook, invoked for every method call in this table.
    pub fn after(
        mut self,
        hook: impl Fn(&str, Duration, Option<&Value>) + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Arc::new(hook));
        self
    }

    /// The table's registration id.
    pub fn registration(&self) -> &RegistrationId {
        &self.registration
    }

    /// Registered method names, in order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }
}

/// One resolved call, detached from the registry.
///
/// Resolution happens on the dispatching task; execution owns its own
/// clones of the handler and hooks, so it can run on any task without
/// borrowing the registry. Calls in flight never block each other.
pub struct PreparedCall {
    registration: RegistrationId,
    method: String,
    handler: Arc<dyn RpcHandler>,
    before: Option<BeforeHook>,
    after: Option<AfterHook>,
}

impl PreparedCall {
    /// Run the call to settlement and wrap the outcome in an envelope.
    pub async fn run(self, args: Vec<Value>) -> CallEnvelope {
        let started = Instant::now();
        let outcome = match &self.before {
            Some(hook) => match hook(&self.method, &args) {
                Ok(()) => self.handler.call(args).await,
                Err(err) => Err(err),
            },
            None => self.handler.call(args).await,
        };

        // The after hook runs exactly once whether the before hook aborted,
        // the handler failed, or the call resolved.
        if let Some(hook) = &self.after {
            hook(&self.method, started.elapsed(), outcome.as_ref().ok());
        }

        debug!(
            registration = %self.registration,
            method = %self.method,
            success = outcome.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rpc call settled"
        );
        CallEnvelope::from(outcome)
    }
}

/// Registry of method tables on the privileged side.
#[derive(Default)]
pub struct RpcCoordinator {
    tables: HashMap<RegistrationId, MethodTable>,
}

impl RpcCoordinator {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Register a method table. Registration ids are unique; re-registering
    /// the same id is an error.
    pub fn register(&mut self, table: MethodTable) -> Result<()> {
        let registration = table.registration().clone();
        if self.tables.contains_key(&registration) {
            return Err(BridgeError::AlreadyInitialized(format!(
                "method table {registration} is already registered"
            )));
        }
        debug!(%registration, methods = table.methods.len(), "registered method table");
        self.tables.insert(registration, table);
        Ok(())
    }

    /// Whether a registration id is known.
    pub fn contains(&self, registration: &RegistrationId) -> bool {
        self.tables.contains_key(registration)
    }

    /// Resolve a call without running it.
    ///
    /// Unknown registrations and methods are terminal here, before any hook
    /// runs. The returned call is self-contained and may be spawned.
    pub fn prepare(&self, registration: &RegistrationId, method: &str) -> Result<PreparedCall> {
        let table = self
            .tables
            .get(registration)
            .ok_or_else(|| BridgeError::ServiceNotFound {
                registration: registration.clone(),
            })?;
        let handler = table
            .methods
            .get(method)
            .ok_or_else(|| BridgeError::MethodNotFound {
                registration: registration.clone(),
                method: method.to_string(),
            })?;
        Ok(PreparedCall {
            registration: registration.clone(),
            method: method.to_string(),
            handler: Arc::clone(handler),
            before: table.before.clone(),
            after: table.after.clone(),
        })
    }

    /// Resolve and run a call on the current task.
    ///
    /// Errors never escape raw; the caller always receives an envelope it
    /// can unwrap on its own side.
    pub async fn dispatch(
        &self,
        registration: &RegistrationId,
        method: &str,
        args: Vec<Value>,
    ) -> CallEnvelope {
        match self.prepare(registration, method) {
            Ok(call) => call.run(args).await,
            Err(err) => CallEnvelope::err(err),
        }
    }
}
