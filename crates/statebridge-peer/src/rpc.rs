//! Peer-side RPC: method calls into the privileged registry plus event
//! subscriptions.

use tokio::sync::mpsc;

use statebridge_core::{BridgeError, RegistrationId, Request, Response, Result, Value};

use crate::router::PeerRouter;

/// Client for one registered method table.
#[derive(Clone)]
pub struct RpcClient {
    registration: RegistrationId,
    router: PeerRouter,
}

impl RpcClient {
    /// Bind a client to a registration id. No validation happens here; an
    /// unknown id surfaces as `ServiceNotFound` on the first call.
    pub fn new(registration: RegistrationId, router: PeerRouter) -> Self {
        Self {
            registration,
            router,
        }
    }

    /// The bound registration id.
    pub fn registration(&self) -> &RegistrationId {
        &self.registration
    }

    /// Invoke a method and unwrap its envelope.
    ///
    /// Dispatch failures and handler rejections both arrive as the
    /// reconstructed error, indistinguishable from a local one.
    pub async fn call(&self, method: impl Into<String>, args: Vec<Value>) -> Result<Value> {
        let response = self
            .router
            .transport()
            .invoke(Request::RpcCall {
                registration: self.registration.clone(),
                method: method.into(),
                args,
            })
            .await?;
        match response {
            Response::Call(envelope) => envelope.into_result(),
            Response::Err(wire) => Err(wire.into()),
            other => Err(BridgeError::TransportFailed(format!(
                "unexpected response to rpc-call: {other:?}"
            ))),
        }
    }

    /// Subscribe to broadcasts of one named event from this registration.
    pub fn events(&self, event: impl Into<String>) -> mpsc::UnboundedReceiver<Value> {
        self.router.subscribe_event(self.registration.clone(), event)
    }
}
