//! Single-hop routing between the origin and observer registries.

use crate::registry::{Delivery, Registry};
use courier_types::{ClientClass, ClientId, Event, EventBody, EventKind, PingPayload};

/// What the router did with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The event was queued for the target.
    Forwarded { target: ClientId },
    /// The target was not live in the opposite registry; nothing was sent.
    Dropped { target: ClientId },
    /// The event needs no routing.
    Ignored,
    /// An unknown kind, logged and otherwise discarded.
    Recorded,
}

/// Forwards pings and ping responses to the opposite registry.
///
/// The router never forwards a forwarded event again: each call performs at
/// most one send.
#[derive(Clone)]
pub struct RelayRouter {
    origin: Registry,
    observer: Registry,
}

impl RelayRouter {
    pub fn new(origin: Registry, observer: Registry) -> Self {
        Self { origin, observer }
    }

    fn registry_for(&self, class: ClientClass) -> Option<&Registry> {
        match class {
            ClientClass::Origin => Some(&self.origin),
            ClientClass::Observer => Some(&self.observer),
            ClientClass::Relay => None,
        }
    }

    /// Routes a validated event that arrived on the sender's connection.
    pub async fn route(&self, event: Event) -> RouteOutcome {
        let Event {
            sender_id,
            sender_class,
            body,
            ..
        } = event;

        match body {
            EventBody::Ping(payload) => {
                self.forward(sender_id, sender_class, EventKind::Ping, payload)
                    .await
            }
            EventBody::PingResponse(payload) => {
                self.forward(sender_id, sender_class, EventKind::PingResponse, payload)
                    .await
            }
            EventBody::Connect(_) => RouteOutcome::Ignored,
            // Relay-only kinds never pass ingress validation.
            EventBody::ConnectionAck(_) | EventBody::DataRequest(_) | EventBody::RosterUpdate(_) => {
                RouteOutcome::Ignored
            }
            EventBody::Unknown { kind, payload } => {
                tracing::info!(
                    client_id = %sender_id,
                    class = %sender_class,
                    kind = %kind,
                    payload = ?payload,
                    "unknown event"
                );
                RouteOutcome::Recorded
            }
        }
    }

    async fn forward(
        &self,
        sender_id: ClientId,
        sender_class: ClientClass,
        kind: EventKind,
        payload: PingPayload,
    ) -> RouteOutcome {
        let Some(target_registry) = sender_class.opposite().and_then(|c| self.registry_for(c))
        else {
            return RouteOutcome::Ignored;
        };

        let target = payload.target_id;
        let retagged = PingPayload {
            target_id: target.clone(),
            requester_class: Some(sender_class),
        };
        let body = match kind {
            EventKind::PingResponse => EventBody::PingResponse(retagged),
            _ => EventBody::Ping(retagged),
        };
        let event = Event::new(sender_id.clone(), sender_class, body);

        match target_registry.send(&target, &event).await {
            Delivery::Sent => {
                tracing::debug!(
                    client_id = %sender_id,
                    target_id = %target,
                    kind = %kind,
                    "forwarded"
                );
                RouteOutcome::Forwarded { target }
            }
            Delivery::NoSuchClient | Delivery::Failed => {
                tracing::debug!(
                    client_id = %sender_id,
                    target_id = %target,
                    kind = %kind,
                    "target unreachable; dropped"
                );
                RouteOutcome::Dropped { target }
            }
        }
    }
}
