//! Tests for the per-class connection registry.

use courier_server::registry::{Delivery, Registry};
use courier_types::{ClientClass, ClientId, Event, EventBody, EventKind, RosterPayload};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

fn channel() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
    mpsc::unbounded_channel::<String>()
}

fn roster_event() -> Event {
    Event::from_relay(EventBody::RosterUpdate(RosterPayload::default()))
}

#[tokio::test]
async fn ack_is_first_frame_and_names_assigned_id() {
    let registry = Registry::new(ClientClass::Origin);
    let (tx, mut rx) = channel();

    let ack = registry.connect(tx).await;
    registry.send(&ack.assigned_id, &roster_event()).await;

    let first = Event::decode(&rx.recv().await.expect("ack frame")).expect("decodes");
    assert_eq!(first.kind(), EventKind::ConnectionAck);
    match first.body {
        EventBody::ConnectionAck(payload) => {
            assert_eq!(payload.assigned_id, ack.assigned_id);
            assert_eq!(payload.client_type, ClientClass::Origin);
        }
        other => panic!("expected ack, got {:?}", other),
    }

    let second = Event::decode(&rx.recv().await.expect("second frame")).expect("decodes");
    assert_eq!(second.kind(), EventKind::RosterUpdate);
}

#[tokio::test]
async fn concurrent_connects_get_unique_ids() {
    let registry = Arc::new(Registry::new(ClientClass::Observer));
    let mut handles = Vec::new();

    for _ in 0..200 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (tx, _rx) = channel();
            registry.connect(tx).await.assigned_id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle.await.expect("connect should not panic");
        assert!(ids.insert(id), "duplicate identifier issued");
    }
    assert_eq!(registry.len().await, 200);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let registry = Registry::new(ClientClass::Origin);
    let (tx, _rx) = channel();
    let id = registry.connect(tx).await.assigned_id;

    assert!(registry.disconnect(&id).await, "first disconnect removes");
    let after_once = registry.list().await;

    assert!(!registry.disconnect(&id).await, "second disconnect is a no-op");
    assert_eq!(registry.list().await, after_once);
    assert!(registry.is_empty().await);

    assert!(!registry.disconnect(&ClientId::from("never-existed")).await);
}

#[tokio::test]
async fn send_to_missing_client_is_silent() {
    let registry = Registry::new(ClientClass::Origin);
    let delivery = registry
        .send(&ClientId::from("ghost"), &roster_event())
        .await;
    assert_eq!(delivery, Delivery::NoSuchClient);
}

#[tokio::test]
async fn send_to_closed_writer_fails() {
    let registry = Registry::new(ClientClass::Origin);
    let (tx, rx) = channel();
    let id = registry.connect(tx).await.assigned_id;
    drop(rx);

    assert_eq!(registry.send(&id, &roster_event()).await, Delivery::Failed);
}

#[tokio::test]
async fn list_is_a_snapshot() {
    let registry = Registry::new(ClientClass::Origin);
    let (tx1, _rx1) = channel();
    let (tx2, _rx2) = channel();
    let a = registry.connect(tx1).await.assigned_id;

    let snapshot = registry.list().await;
    let b = registry.connect(tx2).await.assigned_id;
    registry.disconnect(&a).await;

    assert_eq!(snapshot, vec![a.clone()], "snapshot unaffected by later mutation");
    assert_eq!(registry.list().await, vec![b.clone()]);
    assert!(registry.contains(&b).await);
    assert!(!registry.contains(&a).await);
}

#[tokio::test]
async fn disconnect_closes_outbound_queue() {
    let registry = Registry::new(ClientClass::Observer);
    let (tx, mut rx) = channel();
    let id = registry.connect(tx).await.assigned_id;

    assert!(rx.recv().await.is_some(), "ack");
    registry.disconnect(&id).await;
    assert!(rx.recv().await.is_none(), "queue closes once the entry is gone");
}

#[tokio::test]
async fn registries_are_independent() {
    let origin = Registry::new(ClientClass::Origin);
    let observer = Registry::new(ClientClass::Observer);
    let (tx, _rx) = channel();
    let id = origin.connect(tx).await.assigned_id;

    assert!(origin.contains(&id).await);
    assert!(!observer.contains(&id).await);
    assert_eq!(observer.send(&id, &roster_event()).await, Delivery::NoSuchClient);
}

#[tokio::test]
async fn concurrent_connect_disconnect_no_deadlock() {
    let registry = Arc::new(Registry::new(ClientClass::Origin));
    let mut handles = Vec::new();

    for _ in 0..100 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (tx, _rx) = channel();
            let id = registry.connect(tx).await.assigned_id;
            registry.send(&id, &roster_event()).await;
            let _ = registry.list().await;
            assert!(registry.disconnect(&id).await);
            assert!(!registry.disconnect(&id).await);
        }));
    }

    for handle in handles {
        handle.await.expect("task should not panic");
    }
    assert!(registry.is_empty().await);
}
