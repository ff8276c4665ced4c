//! HttpSimulator against an in-process backend.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use dial_client::{ClientConfig, Error, HttpSimulator, SimulatorApi};
use dial_model::{LogicalClock, MessageId};
use serde_json::{json, Value};

type Received = Arc<Mutex<Vec<Vec<String>>>>;

async fn spawn_backend(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, timeout: Duration) -> HttpSimulator {
    let config = ClientConfig::default()
        .with_base_url(format!("http://{addr}"))
        .with_timeout(timeout);
    HttpSimulator::new(config).unwrap()
}

fn backend(received: Received) -> Router {
    Router::new()
        .route(
            "/topology",
            get(|| async { Json(json!({"nodes": ["A", "B"], "edges": [["A", "B"]]})) }),
        )
        .route(
            "/messages",
            get(|| async {
                Json(json!({
                    "time": 5,
                    "theta": 0,
                    "messages": {
                        "5": [{
                            "id": "m1", "source": "A/echo/i", "target": "B/echo/i",
                            "color": "red", "title": "hello",
                            "creation_time": 4, "creation_theta": 0,
                            "arrival_time": 5, "arrival_theta": 0,
                            "is_lost": "False", "self_message": "False",
                            "parent": "None", "children": []
                        }]
                    }
                }))
            }),
        )
        .route(
            "/step-forward/{n}",
            get(|Path(n): Path<u64>| async move {
                Json(json!({"time": n, "theta": 0, "steps": n, "actions": []}))
            }),
        )
        .route(
            "/time-backward/{n}",
            get(|Path(_n): Path<u64>| async {
                (StatusCode::MULTIPLE_CHOICES, "Can not move further back in time.")
            }),
        )
        .route(
            "/states",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"colors": {}, "neighbors": {}}))
            }),
        )
        .route("/next", get(|| async { "not json" }))
        .route("/reset", get(|| async { Json(json!("OK")) }))
        .route(
            "/reorder",
            put(
                |State(received): State<Received>, Json(order): Json<Vec<String>>| async move {
                    if let Ok(mut log) = received.lock() {
                        log.push(order);
                    }
                    StatusCode::OK
                },
            ),
        )
        .route(
            "/message/{id}",
            get(|Path(id): Path<String>| async move { Json(json!({"uuid": id, "data": {"k": 1}})) }),
        )
        .with_state(received)
}

#[tokio::test]
async fn decodes_snapshots() {
    let addr = spawn_backend(backend(Received::default())).await;
    let sim = client(addr, Duration::from_secs(5));

    let topology = sim.topology().await.unwrap();
    assert!(topology.has_edge("A", "B"));

    let snapshot = sim.messages().await.unwrap();
    assert_eq!(snapshot.clock(), LogicalClock::at(5, 0));
    let m1 = &snapshot.messages[&5][0];
    assert_eq!(m1.emit_time, 4);
    assert!(!m1.is_lost);
    assert_eq!(m1.parent, None);

    let step = sim.step_forward(3).await.unwrap();
    assert_eq!(step.clock(), LogicalClock::at(3, 0));

    let doc: Value = sim.message(&MessageId::from("m1")).await.unwrap();
    assert_eq!(doc["data"]["k"], 1);
}

#[tokio::test]
async fn acks_ignore_their_body() {
    let received = Received::default();
    let addr = spawn_backend(backend(received.clone())).await;
    let sim = client(addr, Duration::from_secs(5));

    sim.reset().await.unwrap();
    sim.reorder(&[MessageId::from("b"), MessageId::from("a")])
        .await
        .unwrap();
    let log = received.lock().unwrap().clone();
    assert_eq!(log, vec![vec!["b".to_string(), "a".to_string()]]);
}

#[tokio::test]
async fn classifies_failures() {
    let addr = spawn_backend(backend(Received::default())).await;
    let sim = client(addr, Duration::from_millis(100));

    let err = sim.time_backward(1).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 300, .. }));
    assert!(err.is_connectivity());

    let err = sim.next().await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)));

    let err = sim.states().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    // Unknown route
    let err = sim.jump_to_end().await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 404, .. }));
}

#[tokio::test]
async fn unreachable_backend_is_connection_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sim = client(addr, Duration::from_secs(2));
    let err = sim.topology().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
}
