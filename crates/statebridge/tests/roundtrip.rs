//! End-to-end tests over the in-memory transport: one real hub task, real
//! peers, both sync paths and RPC.

use std::sync::{Arc, Mutex};

use serde_json::json;
use statebridge::{
    BridgeError, ErrorSink, Hub, HubConfig, MemoryCell, MemoryNetwork, MethodTable, MirrorOptions,
    MirrorPhase, Peer, PeerConfig, PeerTransport, RegistrationQueue, Role, SyncConfig, ValueCell,
};
use statebridge_testkit::settle;

fn trace_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn collecting_sink() -> (ErrorSink, Arc<Mutex<Vec<BridgeError>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let sink: ErrorSink = Arc::new(move |err| {
        sink_seen.lock().unwrap().push(err);
    });
    (sink, seen)
}

#[tokio::test]
async fn test_round_trip_convergence() {
    trace_init();
    let (network, transport) = MemoryNetwork::new();
    let queue = RegistrationQueue::new();
    let hub = Hub::start(transport, HubConfig::default(), &queue).unwrap();

    let hub_cell = Arc::new(MemoryCell::new(json!({"volume": 3})));
    hub.register_entity("settings", Arc::clone(&hub_cell) as Arc<dyn ValueCell>, true)
        .unwrap();
    settle().await;

    let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    assert_eq!(hub.role(), Role::Privileged);
    assert_eq!(peer.role(), Role::Peer);

    let mirror = peer.entity("settings", Arc::new(MemoryCell::new(json!(null))));
    settle().await;

    // Initial fetch.
    assert_eq!(mirror.get(), json!({"volume": 3}));
    assert_eq!(mirror.phase(), MirrorPhase::Live);

    // Hub-side write propagates out.
    hub_cell.set(json!({"volume": 5}));
    settle().await;
    assert_eq!(mirror.get(), json!({"volume": 5}));
    assert_eq!(mirror.last_revision(), Some(1));

    // Peer-side write lands on the hub and echoes back at a new revision
    // without looping.
    mirror.set(json!({"volume": 7})).unwrap();
    settle().await;
    assert_eq!(hub_cell.get(), json!({"volume": 7}));
    assert_eq!(mirror.get(), json!({"volume": 7}));
    assert_eq!(mirror.last_revision(), Some(2));

    hub.destroy().await;
}

#[tokio::test]
async fn test_two_peers_converge_on_one_write() {
    let (network, transport) = MemoryNetwork::new();
    let hub = Hub::start(transport, HubConfig::default(), &RegistrationQueue::new()).unwrap();
    hub.register_entity("doc", Arc::new(MemoryCell::new(json!(""))), true)
        .unwrap();
    settle().await;

    let writer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    let reader = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    let writer_mirror = writer.entity("doc", Arc::new(MemoryCell::new(json!(null))));
    let reader_mirror = reader.entity("doc", Arc::new(MemoryCell::new(json!(null))));
    settle().await;

    writer_mirror.set(json!("edited elsewhere")).unwrap();
    settle().await;

    assert_eq!(reader_mirror.get(), json!("edited elsewhere"));
    assert_eq!(reader_mirror.last_revision(), writer_mirror.last_revision());
}

#[tokio::test]
async fn test_forbidden_peer_write_leaves_hub_state_alone() {
    let (network, transport) = MemoryNetwork::new();
    let config = HubConfig {
        sync: SyncConfig {
            allow_peer_writes: false,
            ..SyncConfig::default()
        },
        errors: None,
    };
    let hub = Hub::start(transport, config, &RegistrationQueue::new()).unwrap();

    let hub_cell = Arc::new(MemoryCell::new(json!("authoritative")));
    hub.register_entity("locked", Arc::clone(&hub_cell) as Arc<dyn ValueCell>, true)
        .unwrap();
    settle().await;

    let (sink, seen) = collecting_sink();
    let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig { errors: Some(sink) });
    let mirror = peer.entity("locked", Arc::new(MemoryCell::new(json!(null))));
    settle().await;

    mirror.set(json!("tampered")).unwrap();
    settle().await;

    // The local cell changed but the hub rejected the forward.
    assert_eq!(hub_cell.get(), json!("authoritative"));
    let errors = seen.lock().unwrap();
    assert!(matches!(
        errors.as_slice(),
        [BridgeError::WriteForbidden { .. }]
    ));
}

#[tokio::test]
async fn test_read_only_mirror_never_forwards() {
    let (network, transport) = MemoryNetwork::new();
    let hub = Hub::start(transport, HubConfig::default(), &RegistrationQueue::new()).unwrap();
    let hub_cell = Arc::new(MemoryCell::new(json!(0)));
    hub.register_entity("counter", Arc::clone(&hub_cell) as Arc<dyn ValueCell>, true)
        .unwrap();
    settle().await;

    let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    let mirror = peer.entity_with(
        "counter",
        Arc::new(MemoryCell::new(json!(null))),
        MirrorOptions {
            read_only: true,
            ..MirrorOptions::default()
        },
    );
    settle().await;

    assert!(matches!(
        mirror.set(json!(99)),
        Err(BridgeError::WriteForbidden { .. })
    ));
    settle().await;
    assert_eq!(hub_cell.get(), json!(0));
}

#[tokio::test]
async fn test_rpc_call_and_event_broadcast() {
    trace_init();
    let (network, transport) = MemoryNetwork::new();
    let hub = Hub::start(transport, HubConfig::default(), &RegistrationQueue::new()).unwrap();

    hub.register_table(MethodTable::new("calc").method("add", |args| async move {
        let sum: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
        Ok(json!(sum))
    }))
    .await
    .unwrap();

    let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    settle().await;
    let calc = peer.rpc("calc");
    let mut results = calc.events("result-published");

    assert_eq!(
        calc.call("add", vec![json!(19), json!(23)]).await.unwrap(),
        json!(42)
    );

    match calc.call("subtract", vec![]).await {
        Err(BridgeError::MethodNotFound { method, .. }) => assert_eq!(method, "subtract"),
        other => panic!("expected MethodNotFound, got {other:?}"),
    }

    hub.broadcast("calc", "result-published", json!(42))
        .await
        .unwrap();
    assert_eq!(results.recv().await.unwrap(), json!(42));
}

#[tokio::test]
async fn test_declarations_queued_before_startup() {
    let queue = RegistrationQueue::new();
    queue
        .enqueue_entity(
            "early".into(),
            Arc::new(MemoryCell::new(json!("queued"))),
        )
        .unwrap();
    queue
        .enqueue_table(MethodTable::new("early-svc").method("ping", |_| async { Ok(json!("pong")) }))
        .unwrap();

    let (network, transport) = MemoryNetwork::new();
    let _hub = Hub::start(transport, HubConfig::default(), &queue).unwrap();

    let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    let mirror = peer.entity("early", Arc::new(MemoryCell::new(json!(null))));
    settle().await;

    assert_eq!(mirror.get(), json!("queued"));
    assert_eq!(
        peer.rpc("early-svc").call("ping", vec![]).await.unwrap(),
        json!("pong")
    );

    // The queue is spent; late declarations go to the hub directly.
    assert!(queue
        .enqueue_entity("late".into(), Arc::new(MemoryCell::new(json!(null))))
        .is_err());
}

#[tokio::test]
async fn test_disconnected_peer_is_skipped_not_fatal() {
    let (network, transport) = MemoryNetwork::new();
    let hub = Hub::start(transport, HubConfig::default(), &RegistrationQueue::new()).unwrap();
    let hub_cell = Arc::new(MemoryCell::new(json!(0)));
    hub.register_entity("k", Arc::clone(&hub_cell) as Arc<dyn ValueCell>, true)
        .unwrap();
    settle().await;

    let gone_transport = Arc::new(network.connect().await);
    let gone = Peer::connect(Arc::clone(&gone_transport) as Arc<dyn PeerTransport>, PeerConfig::default());
    let survivor = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());
    let survivor_mirror = survivor.entity("k", Arc::new(MemoryCell::new(json!(null))));
    settle().await;

    gone.destroy();
    gone_transport.disconnect().await;
    settle().await;

    // Broadcasting after the disconnect still reaches the survivor.
    hub_cell.set(json!(1));
    settle().await;
    assert_eq!(survivor_mirror.get(), json!(1));
}

#[tokio::test]
async fn test_destroyed_hub_rejects_calls() {
    let (network, transport) = MemoryNetwork::new();
    let hub = Hub::start(transport, HubConfig::default(), &RegistrationQueue::new()).unwrap();
    let peer = Peer::connect(Arc::new(network.connect().await), PeerConfig::default());

    hub.destroy().await;

    match peer.rpc("anything").call("ping", vec![]).await {
        Err(BridgeError::TransportFailed(_)) => {}
        other => panic!("expected TransportFailed, got {other:?}"),
    }
}
