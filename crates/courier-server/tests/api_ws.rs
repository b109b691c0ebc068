//! End-to-end tests over real WebSocket connections.

use courier_server::{app, AppState};
use courier_stats::FixedCollector;
use courier_types::{ClientClass, ClientId, Event, EventBody, EventKind, StatsSnapshot};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> (SocketAddr, AppState) {
    let collector = Arc::new(FixedCollector::new(StatsSnapshot {
        cpu_count: 2,
        ..Default::default()
    }));
    let state = AppState::new(collector, Duration::from_millis(50));
    let app = app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn open(addr: SocketAddr, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path))
        .await
        .expect("failed to connect");
    ws
}

async fn next_event(ws: &mut Ws) -> Event {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("transport error");
        if let Message::Text(text) = msg {
            return Event::decode(text.as_str()).expect("server frames decode");
        }
    }
}

/// Skips frames until one of `kind` arrives.
async fn next_of_kind(ws: &mut Ws, kind: EventKind) -> Event {
    loop {
        let event = next_event(ws).await;
        if event.kind() == kind {
            return event;
        }
    }
}

async fn expect_ack(ws: &mut Ws, class: ClientClass) -> ClientId {
    let event = next_event(ws).await;
    match event.body {
        EventBody::ConnectionAck(ack) => {
            assert_eq!(ack.client_type, class);
            assert_eq!(event.sender_class, ClientClass::Relay);
            ack.assigned_id
        }
        other => panic!("first frame must be the ack, got {:?}", other),
    }
}

fn roster(event: &Event) -> HashSet<ClientId> {
    match &event.body {
        EventBody::RosterUpdate(payload) => payload.clients.iter().cloned().collect(),
        other => panic!("expected roster update, got {:?}", other),
    }
}

async fn send(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("failed to send frame");
}

#[tokio::test]
async fn origin_observer_ping_round_trip() {
    let (addr, _state) = start_server().await;

    let mut a = open(addr, "/ws/origin").await;
    let a_id = expect_ack(&mut a, ClientClass::Origin).await;

    let mut b = open(addr, "/ws/observer").await;
    let b_id = expect_ack(&mut b, ClientClass::Observer).await;

    let first_roster = next_event(&mut b).await;
    assert_eq!(roster(&first_roster), HashSet::from([a_id.clone()]));

    send(
        &mut b,
        json!({ "event": "ping", "client_type": "observer", "payload": { "target_id": a_id } }),
    )
    .await;

    let ping = next_event(&mut a).await;
    assert_eq!(ping.kind(), EventKind::Ping);
    assert_eq!(ping.sender_id, b_id);
    assert_eq!(ping.sender_class, ClientClass::Observer);

    send(
        &mut a,
        json!({ "event": "ping_response", "payload": { "target_id": b_id } }),
    )
    .await;

    let response = next_of_kind(&mut b, EventKind::PingResponse).await;
    assert_eq!(response.sender_id, a_id);

    a.close(None).await.expect("close");

    loop {
        let update = next_of_kind(&mut b, EventKind::RosterUpdate).await;
        if roster(&update).is_empty() {
            break;
        }
    }
}

#[tokio::test]
async fn invalid_frames_do_not_close_the_connection() {
    let (addr, state) = start_server().await;

    let mut a = open(addr, "/ws/origin").await;
    let a_id = expect_ack(&mut a, ClientClass::Origin).await;
    let mut b = open(addr, "/ws/observer").await;
    expect_ack(&mut b, ClientClass::Observer).await;

    send(&mut b, json!({ "event": "ping", "payload": {} })).await;
    b.send(Message::Text("not json".into())).await.unwrap();
    send(&mut b, json!({ "event": "roster_update", "payload": { "clients": [] } })).await;
    send(&mut b, json!({ "event": "teleport" })).await;
    send(&mut b, json!({ "event": "ping", "payload": { "target_id": "ghost" } })).await;
    send(&mut b, json!({ "event": "ping", "payload": { "target_id": a_id } })).await;

    let ping = next_event(&mut a).await;
    assert_eq!(ping.kind(), EventKind::Ping, "the valid ping still gets through");

    // The forwarded counter is bumped after delivery.
    tokio::time::timeout(WAIT, async {
        while state.counters.snapshot().forwarded == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("forwarded ping should be counted");

    let counters = state.counters.snapshot();
    assert_eq!(counters.rejected, 3);
    assert_eq!(counters.recorded, 1);
    assert_eq!(counters.dropped, 1);
    assert_eq!(counters.forwarded, 1);
}

#[tokio::test]
async fn stats_endpoint_streams_telemetry_after_connect() {
    let (addr, state) = start_server().await;

    let mut s = open(addr, "/ws/stats").await;
    let s_id = expect_ack(&mut s, ClientClass::Relay).await;
    assert!(state.stats.contains(&s_id).await);

    send(&mut s, json!({ "event": "CONNECT", "client": "SERVER-STATS" })).await;

    for _ in 0..3 {
        let event = next_event(&mut s).await;
        match event.body {
            EventBody::DataRequest(snapshot) => assert_eq!(snapshot.cpu_count, 2),
            other => panic!("expected data_request, got {:?}", other),
        }
    }

    s.close(None).await.expect("close");
    tokio::time::timeout(WAIT, async {
        while state.stats.contains(&s_id).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stats connection should be removed after close");
}

#[tokio::test]
async fn observer_may_subscribe_to_telemetry() {
    let (addr, _state) = start_server().await;

    let mut b = open(addr, "/ws/observer").await;
    expect_ack(&mut b, ClientClass::Observer).await;

    send(&mut b, json!({ "event": "connect", "payload": { "subscribe": "telemetry" } })).await;
    next_of_kind(&mut b, EventKind::DataRequest).await;

    send(&mut b, json!({ "event": "connect", "payload": { "subscribe": "telemetry" } })).await;
    next_of_kind(&mut b, EventKind::DataRequest).await;
}

#[tokio::test]
async fn stats_clients_cannot_ping() {
    let (addr, state) = start_server().await;

    let mut a = open(addr, "/ws/origin").await;
    let a_id = expect_ack(&mut a, ClientClass::Origin).await;
    let mut s = open(addr, "/ws/stats").await;
    expect_ack(&mut s, ClientClass::Relay).await;

    send(&mut s, json!({ "event": "ping", "payload": { "target_id": a_id } })).await;

    tokio::time::timeout(WAIT, async {
        while state.counters.snapshot().rejected == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("ping from a stats client should be rejected");

    assert!(
        tokio::time::timeout(Duration::from_millis(200), a.next()).await.is_err(),
        "origin receives nothing"
    );
}
