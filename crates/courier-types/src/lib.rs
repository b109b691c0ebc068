//! Shared types and the event schema for the Courier relay.
//!
//! This crate defines the client identity model ([`ClientId`],
//! [`ClientClass`]), the closed set of event kinds exchanged over the wire
//! ([`EventKind`], [`EventBody`]), their payloads, and the single ingress
//! validation pass ([`validate`]) that turns a raw text frame into a typed
//! [`Event`].
//!
//! Every frame on the wire is a JSON envelope:
//!
//! ```json
//! {
//!   "event": "ping",
//!   "client_id": "9b2e…",
//!   "client_type": "observer",
//!   "payload": { "target_id": "41c7…" },
//!   "timestamp": "2025-01-01T00:00:00Z"
//! }
//! ```

mod error;
mod event;
mod validation;

pub use error::ValidationError;
pub use event::{
    ConnectPayload, ConnectionAckPayload, CpuFrequency, Envelope, Event, EventBody, EventKind,
    PingPayload, RosterPayload, StatsSnapshot, Subscription,
};
pub use validation::{may_originate_ping, validate};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier assigned to a connection when it is accepted.
///
/// Identifiers are random 128-bit values rendered as hyphenated text. They
/// are unique within the registry that issued them; two registries may in
/// principle hand out the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier the relay uses when it is itself the sender.
    pub fn relay() -> Self {
        Self(RELAY_SENDER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sender identifier stamped on events the relay emits itself.
pub const RELAY_SENDER_ID: &str = "relay";

/// The class of a connection, which decides the registry it lives in and the
/// routing rules applied to what it sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientClass {
    /// Clients tracked in the roster; the usual targets of pings.
    #[serde(rename = "origin")]
    Origin,
    /// Clients that receive roster updates and ping origin clients.
    #[serde(rename = "observer")]
    Observer,
    /// The relay itself, and telemetry-only connections.
    #[serde(rename = "relay", alias = "relay-self")]
    Relay,
}

impl ClientClass {
    /// Returns the canonical wire label for this class.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Observer => "observer",
            Self::Relay => "relay",
        }
    }

    /// The class whose registry receives events routed from this class.
    ///
    /// Returns `None` for [`ClientClass::Relay`], which has no counterpart.
    pub fn opposite(self) -> Option<Self> {
        match self {
            Self::Origin => Some(Self::Observer),
            Self::Observer => Some(Self::Origin),
            Self::Relay => None,
        }
    }
}

impl std::fmt::Display for ClientClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClientClass {
    type Err = ParseClientClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "origin" => Ok(Self::Origin),
            "observer" => Ok(Self::Observer),
            "relay" | "relay-self" => Ok(Self::Relay),
            _ => Err(ParseClientClassError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown client class string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown client class: {0}")]
pub struct ParseClientClassError(pub String);
