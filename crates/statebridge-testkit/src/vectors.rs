//! Golden wire vectors.
//!
//! Both processes of a bridge deployment may be built from different
//! versions of this workspace, so the wire encoding of every message kind is
//! pinned here. A change that breaks one of these strings breaks running
//! deployments.

use serde_json::json;

use statebridge_core::{
    BridgeError, CallEnvelope, EntityKey, Push, RegistrationId, Request, Response, Snapshot,
    WireError,
};

/// Requests with their pinned encodings.
pub fn sample_requests() -> Vec<(Request, &'static str)> {
    vec![
        (
            Request::EntityGet {
                key: EntityKey::new("settings"),
            },
            r#"{"EntityGet":{"key":"settings"}}"#,
        ),
        (
            Request::EntitySet {
                key: EntityKey::new("settings"),
                value: json!({"theme": "dark"}),
            },
            r#"{"EntitySet":{"key":"settings","value":{"theme":"dark"}}}"#,
        ),
        (
            Request::RpcCall {
                registration: RegistrationId::new("calc"),
                method: "add".into(),
                args: vec![json!(1), json!(2)],
            },
            r#"{"RpcCall":{"registration":"calc","method":"add","args":[1,2]}}"#,
        ),
    ]
}

/// Responses with their pinned encodings.
pub fn sample_responses() -> Vec<(Response, &'static str)> {
    vec![
        (
            Response::Snapshot(Snapshot::new(EntityKey::new("counter"), 3, json!(42))),
            r#"{"Snapshot":{"key":"counter","revision":3,"value":42}}"#,
        ),
        (Response::Ack, r#""Ack""#),
        (
            Response::Call(CallEnvelope::ok(json!("pong"))),
            r#"{"Call":{"ok":{"result":"pong"}}}"#,
        ),
        (
            Response::Err(WireError::from(BridgeError::EntityNotFound {
                key: EntityKey::new("missing"),
            })),
            r#"{"Err":{"code":"EntityNotFound","message":"entity not found: missing","key":"missing"}}"#,
        ),
    ]
}

/// Pushes with their pinned encodings.
pub fn sample_pushes() -> Vec<(Push, &'static str)> {
    vec![
        (
            Push::EntityUpdate(Snapshot::new(EntityKey::new("counter"), 4, json!(43))),
            r#"{"EntityUpdate":{"key":"counter","revision":4,"value":43}}"#,
        ),
        (
            Push::RpcEvent {
                registration: RegistrationId::new("jobs"),
                event: "done".into(),
                data: json!({"id": 7}),
            },
            r#"{"RpcEvent":{"registration":"jobs","event":"done","data":{"id":7}}}"#,
        ),
    ]
}
