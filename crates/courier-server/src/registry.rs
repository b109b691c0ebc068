//! Per-class connection registry.

use chrono::{DateTime, Utc};
use courier_types::{ClientClass, ClientId, ConnectionAckPayload, Event, EventBody};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};

/// Outbound half of a connection: frames queued here are written to the
/// socket by the connection's writer task.
///
/// The queue is unbounded. A slow peer grows its own queue and stalls only
/// its own writer.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Result of a [`Registry::send`].
///
/// Routing ignores this value; delivery is best-effort either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was queued for the connection.
    Sent,
    /// No live connection has that identifier.
    NoSuchClient,
    /// The connection exists but its writer is gone, or the event could not
    /// be encoded.
    Failed,
}

struct ClientHandle {
    outbound: Outbound,
    connected_at: DateTime<Utc>,
}

/// Owns the live connections of one client class.
///
/// Cloning yields another handle to the same map. Every operation takes the
/// lock once, so inserts, removals and lookups are atomic with respect to
/// each other. Two registries never share a lock.
#[derive(Clone)]
pub struct Registry {
    class: ClientClass,
    connections: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
}

impl Registry {
    pub fn new(class: ClientClass) -> Self {
        Self {
            class,
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn class(&self) -> ClientClass {
        self.class
    }

    /// Registers a new connection and returns its acknowledgment.
    ///
    /// The `connection_ack` frame is queued on `outbound` before the entry is
    /// inserted, so it is always the first frame the connection receives.
    pub async fn connect(&self, outbound: Outbound) -> ConnectionAckPayload {
        let mut connections = self.connections.write().await;

        let mut id = ClientId::generate();
        while connections.contains_key(&id) {
            id = ClientId::generate();
        }

        let now = Utc::now();
        let ack = ConnectionAckPayload {
            assigned_id: id.clone(),
            client_type: self.class,
            server_time: now,
        };

        match Event::from_relay(EventBody::ConnectionAck(ack.clone())).to_json() {
            Ok(json) => {
                if outbound.send(json).is_err() {
                    tracing::debug!(client_id = %id, class = %self.class, "connection closed before ack");
                }
            }
            Err(e) => {
                tracing::error!(client_id = %id, "failed to serialize connection ack: {}", e);
            }
        }

        connections.insert(
            id.clone(),
            ClientHandle {
                outbound,
                connected_at: now,
            },
        );

        tracing::info!(
            client_id = %id,
            class = %self.class,
            active = connections.len(),
            "client connected"
        );
        ack
    }

    /// Removes a connection. Returns `true` only for the call that actually
    /// removed it; repeated calls are no-ops.
    ///
    /// Dropping the entry drops the outbound queue, which ends the writer task
    /// and closes the socket.
    pub async fn disconnect(&self, id: &ClientId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.remove(id) {
            Some(handle) => {
                let lifetime = Utc::now() - handle.connected_at;
                tracing::info!(
                    client_id = %id,
                    class = %self.class,
                    lifetime_ms = lifetime.num_milliseconds(),
                    active = connections.len(),
                    "client disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Sends an event to a connection if it is live. Absent targets are
    /// skipped silently.
    pub async fn send(&self, id: &ClientId, event: &Event) -> Delivery {
        match event.to_json() {
            Ok(json) => self.send_json(id, json).await,
            Err(e) => {
                tracing::error!(client_id = %id, kind = %event.kind(), "failed to serialize event: {}", e);
                Delivery::Failed
            }
        }
    }

    /// Sends an already-encoded frame. Used when one frame fans out to many
    /// connections.
    pub async fn send_json(&self, id: &ClientId, json: String) -> Delivery {
        let connections = self.connections.read().await;
        match connections.get(id) {
            Some(handle) => match handle.outbound.send(json) {
                Ok(()) => Delivery::Sent,
                Err(_) => {
                    tracing::debug!(client_id = %id, class = %self.class, "writer gone; frame dropped");
                    Delivery::Failed
                }
            },
            None => Delivery::NoSuchClient,
        }
    }

    /// Returns a snapshot of the live identifiers, sorted.
    pub async fn list(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.connections.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn contains(&self, id: &ClientId) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
