//! Ingress validation for frames arriving on relay connections.
//!
//! [`validate`] is the only way an inbound frame becomes an [`Event`]. It
//! enforces kind/payload pairing, keeps relay-only kinds out of client
//! traffic, and restricts which classes may address pings. Unknown kinds are
//! accepted as [`EventBody::Unknown`] so newer clients are not cut off.

use crate::error::ValidationError;
use crate::event::{Event, EventBody, EventKind, InboundEnvelope};
use crate::{ClientClass, ClientId};

/// Whether a connection of `class` may send `ping` and `ping_response`.
pub fn may_originate_ping(class: ClientClass) -> bool {
    matches!(class, ClientClass::Origin | ClientClass::Observer)
}

/// Validates a raw text frame received on the connection `(sender_id, class)`.
///
/// The returned event always carries the connection's own identity; any
/// `client_id` in the envelope is ignored, and a `client_type` naming a known
/// class other than `class` is rejected. Unreadable optional fields are
/// ignored.
pub fn validate(
    raw: &str,
    sender_id: &ClientId,
    class: ClientClass,
) -> Result<Event, ValidationError> {
    let envelope = InboundEnvelope::parse(raw)?;

    if let Some(declared) = envelope.declared_class() {
        if declared != class {
            return Err(ValidationError::ClassMismatch {
                declared,
                actual: class,
            });
        }
    }

    let kind = EventKind::from_wire(&envelope.event);
    if kind.is_relay_only() {
        return Err(ValidationError::RelayOnlyKind(kind));
    }
    if matches!(kind, EventKind::Ping | EventKind::PingResponse) && !may_originate_ping(class) {
        return Err(ValidationError::ClassNotPermitted { kind, class });
    }

    let timestamp = envelope.timestamp();
    let body = EventBody::decode(&envelope.event, envelope.payload)?;

    Ok(Event {
        sender_id: sender_id.clone(),
        sender_class: class,
        body,
        timestamp,
    })
}
