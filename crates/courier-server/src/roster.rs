//! Roster updates from the origin registry to observers.

use crate::registry::{Delivery, Registry};
use courier_types::{ClientId, Event, EventBody, RosterPayload};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Pushes the set of live origin identifiers to observers.
///
/// Broadcasts are serialized so that the last roster an observer receives
/// always reflects the latest origin membership change.
#[derive(Clone)]
pub struct RosterBroadcaster {
    origin: Registry,
    observer: Registry,
    gate: Arc<Mutex<()>>,
}

impl RosterBroadcaster {
    pub fn new(origin: Registry, observer: Registry) -> Self {
        Self {
            origin,
            observer,
            gate: Arc::new(Mutex::new(())),
        }
    }

    async fn encode(&self) -> Option<String> {
        let clients = self.origin.list().await;
        match Event::from_relay(EventBody::RosterUpdate(RosterPayload { clients })).to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!("failed to serialize roster update: {}", e);
                None
            }
        }
    }

    /// Sends the current roster to every live observer. Returns the number of
    /// observers it was queued for.
    ///
    /// A failed delivery to one observer does not stop the others.
    pub async fn broadcast(&self) -> usize {
        let _guard = self.gate.lock().await;
        if self.observer.is_empty().await {
            tracing::debug!("no observers; roster broadcast skipped");
            return 0;
        }
        let Some(json) = self.encode().await else {
            return 0;
        };

        let observers = self.observer.list().await;
        let mut delivered = 0;
        for id in &observers {
            if self.observer.send_json(id, json.clone()).await == Delivery::Sent {
                delivered += 1;
            }
        }

        tracing::debug!(observers = observers.len(), delivered, "roster broadcast");
        delivered
    }

    /// Sends the current roster to one observer, typically right after its
    /// acknowledgment.
    pub async fn send_snapshot(&self, observer_id: &ClientId) -> Delivery {
        let _guard = self.gate.lock().await;
        match self.encode().await {
            Some(json) => self.observer.send_json(observer_id, json).await,
            None => Delivery::Failed,
        }
    }
}
