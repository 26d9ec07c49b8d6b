//! Wire message types exchanged over the transport.
//!
//! Requests travel peer → hub on the request/response path; pushes travel
//! hub → peer on the fire-and-forget broadcast path. Errors never cross the
//! boundary raw: they are wrapped in [`WireError`] so the receiving side can
//! reconstruct an equivalent [`BridgeError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, ErrorCode, Result};
use crate::types::{EntityKey, RegistrationId, Snapshot};

/// Channel names for the message surface.
///
/// Names are prefixable so independently-developed modules sharing one
/// transport do not collide.
pub mod channel {
    /// Request the current snapshot for a key.
    pub const ENTITY_GET: &str = "entity-get";
    /// Relay a peer-local write to the ledger.
    pub const ENTITY_SET: &str = "entity-set";
    /// Snapshot broadcast from the privileged side.
    pub const ENTITY_UPDATE: &str = "entity-update";
    /// Invoke a method on a registered table.
    pub const RPC_CALL: &str = "rpc-call";
    /// Out-of-band event broadcast tied to a registration id.
    pub const RPC_EVENT: &str = "rpc-event";

    /// Apply a module prefix to a channel name.
    pub fn scoped(prefix: &str, name: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}:{name}")
        }
    }
}

/// Request from a peer to the privileged side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// `entity-get`: fetch the current snapshot for a key.
    EntityGet { key: EntityKey },
    /// `entity-set`: relay a peer-local write.
    EntitySet { key: EntityKey, value: Value },
    /// `rpc-call`: invoke a method on a registered table.
    RpcCall {
        registration: RegistrationId,
        method: String,
        args: Vec<Value>,
    },
}

impl Request {
    /// The channel name this request travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Request::EntityGet { .. } => channel::ENTITY_GET,
            Request::EntitySet { .. } => channel::ENTITY_SET,
            Request::RpcCall { .. } => channel::RPC_CALL,
        }
    }
}

/// Response from the privileged side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Answer to `entity-get`.
    Snapshot(Snapshot),
    /// Answer to a successful `entity-set`.
    Ack,
    /// Answer to `rpc-call`; errors ride inside the envelope.
    Call(CallEnvelope),
    /// Failure answer to `entity-get` / `entity-set`.
    Err(WireError),
}

/// Broadcast from the privileged side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Push {
    /// `entity-update`: full-state snapshot fan-out.
    EntityUpdate(Snapshot),
    /// `rpc-event`: receivers filter by exact (registration, event) match.
    RpcEvent {
        registration: RegistrationId,
        event: String,
        data: Value,
    },
}

impl Push {
    /// The channel name this push travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Push::EntityUpdate(_) => channel::ENTITY_UPDATE,
            Push::RpcEvent { .. } => channel::RPC_EVENT,
        }
    }
}

/// Success/failure wrapper returned from every RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEnvelope {
    /// The handler resolved.
    Ok { result: Value },
    /// The dispatch or the handler rejected.
    Err { error: WireError },
}

impl CallEnvelope {
    /// Wrap a successful result.
    pub fn ok(result: Value) -> Self {
        CallEnvelope::Ok { result }
    }

    /// Wrap a failure.
    pub fn err(error: BridgeError) -> Self {
        CallEnvelope::Err {
            error: WireError::from(error),
        }
    }

    /// Whether the call succeeded.
    pub fn success(&self) -> bool {
        matches!(self, CallEnvelope::Ok { .. })
    }

    /// Unwrap into a result, reconstructing the error on failure.
    pub fn into_result(self) -> Result<Value> {
        match self {
            CallEnvelope::Ok { result } => Ok(result),
            CallEnvelope::Err { error } => Err(error.into()),
        }
    }
}

impl From<Result<Value>> for CallEnvelope {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => CallEnvelope::ok(value),
            Err(error) => CallEnvelope::err(error),
        }
    }
}

/// Serializable error envelope.
///
/// Carries the stable code, a human-readable message, the implicated
/// key/registration when applicable, and optional trace metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub registration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace: Option<String>,
}

impl From<BridgeError> for WireError {
    fn from(err: BridgeError) -> Self {
        let message = err.to_string();
        let code = err.code();
        let (key, registration, method) = match &err {
            BridgeError::EntityNotFound { key }
            | BridgeError::WriteForbidden { key }
            | BridgeError::SerializationFailed { key, .. }
            | BridgeError::ValidationFailed { key, .. } => {
                (Some(key.as_str().to_string()), None, None)
            }
            BridgeError::ServiceNotFound { registration } => {
                (None, Some(registration.as_str().to_string()), None)
            }
            BridgeError::MethodNotFound {
                registration,
                method,
            } => (
                None,
                Some(registration.as_str().to_string()),
                Some(method.clone()),
            ),
            BridgeError::TransportFailed(_) | BridgeError::AlreadyInitialized(_) => {
                (None, None, None)
            }
        };
        Self {
            code,
            message,
            key,
            registration,
            method,
            trace: None,
        }
    }
}

impl From<WireError> for BridgeError {
    fn from(wire: WireError) -> Self {
        let key = EntityKey::new(wire.key.clone().unwrap_or_default());
        let registration = RegistrationId::new(wire.registration.clone().unwrap_or_default());
        match wire.code {
            ErrorCode::EntityNotFound => BridgeError::EntityNotFound { key },
            ErrorCode::WriteForbidden => BridgeError::WriteForbidden { key },
            ErrorCode::SerializationFailed => BridgeError::SerializationFailed {
                key,
                reason: wire.message,
            },
            ErrorCode::ValidationFailed => BridgeError::ValidationFailed {
                key,
                reason: wire.message,
            },
            ErrorCode::ServiceNotFound => BridgeError::ServiceNotFound { registration },
            ErrorCode::MethodNotFound => BridgeError::MethodNotFound {
                registration,
                method: wire.method.unwrap_or(wire.message),
            },
            ErrorCode::TransportFailed => BridgeError::TransportFailed(wire.message),
            ErrorCode::AlreadyInitialized => BridgeError::AlreadyInitialized(wire.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_scoping() {
        assert_eq!(channel::scoped("", channel::ENTITY_GET), "entity-get");
        assert_eq!(
            channel::scoped("settings", channel::ENTITY_UPDATE),
            "settings:entity-update"
        );
    }

    #[test]
    fn test_messages_name_their_channels() {
        let get = Request::EntityGet {
            key: EntityKey::new("k"),
        };
        let set = Request::EntitySet {
            key: EntityKey::new("k"),
            value: json!(1),
        };
        let call = Request::RpcCall {
            registration: RegistrationId::new("svc"),
            method: "m".into(),
            args: vec![],
        };
        assert_eq!(get.channel(), channel::ENTITY_GET);
        assert_eq!(set.channel(), channel::ENTITY_SET);
        assert_eq!(call.channel(), channel::RPC_CALL);

        let update = Push::EntityUpdate(Snapshot {
            key: EntityKey::new("k"),
            revision: 0,
            value: json!(null),
        });
        let event = Push::RpcEvent {
            registration: RegistrationId::new("svc"),
            event: "tick".into(),
            data: json!(null),
        };
        assert_eq!(update.channel(), channel::ENTITY_UPDATE);
        assert_eq!(event.channel(), channel::RPC_EVENT);
    }

    #[test]
    fn test_envelope_success_flag() {
        let ok = CallEnvelope::ok(json!(1));
        assert!(ok.success());

        let err = CallEnvelope::err(BridgeError::ServiceNotFound {
            registration: RegistrationId::new("svc"),
        });
        assert!(!err.success());
    }

    #[test]
    fn test_error_reconstruction_roundtrip() {
        let original = BridgeError::EntityNotFound {
            key: EntityKey::new("missing"),
        };
        let wire = WireError::from(original.clone());
        let encoded = serde_json::to_string(&wire).unwrap();
        let decoded: WireError = serde_json::from_str(&encoded).unwrap();
        let reconstructed: BridgeError = decoded.into();
        assert_eq!(reconstructed.code(), original.code());
        match reconstructed {
            BridgeError::EntityNotFound { key } => assert_eq!(key.as_str(), "missing"),
            other => panic!("expected EntityNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_service_not_found_carries_registration() {
        let wire = WireError::from(BridgeError::ServiceNotFound {
            registration: RegistrationId::new("telemetry"),
        });
        assert_eq!(wire.registration.as_deref(), Some("telemetry"));
        assert_eq!(wire.key, None);
        let back: BridgeError = wire.into();
        match back {
            BridgeError::ServiceNotFound { registration } => {
                assert_eq!(registration.as_str(), "telemetry");
            }
            other => panic!("expected ServiceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_into_result() {
        let err = CallEnvelope::err(BridgeError::TransportFailed("pipe closed".into()));
        match err.into_result() {
            Err(BridgeError::TransportFailed(msg)) => {
                assert!(msg.contains("pipe closed"));
            }
            other => panic!("expected TransportFailed, got {other:?}"),
        }
    }
}
