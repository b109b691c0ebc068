//! Event kinds, payloads, and the wire envelope.

use crate::error::ValidationError;
use crate::{ClientClass, ClientId};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The closed set of event kinds understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Sent by a client after the handshake; may request a subscription.
    Connect,
    /// Sent by the relay as the first frame on every new connection.
    ConnectionAck,
    /// A ping addressed to a client in the opposite registry.
    Ping,
    /// The answer to a ping, addressed back across the registries.
    PingResponse,
    /// A telemetry snapshot pushed to a subscriber.
    DataRequest,
    /// The current set of origin identifiers, pushed to observers.
    RosterUpdate,
    /// Any kind this build does not know about.
    Unknown,
}

impl EventKind {
    /// Returns the canonical wire label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::ConnectionAck => "connection_ack",
            Self::Ping => "ping",
            Self::PingResponse => "ping_response",
            Self::DataRequest => "data_request",
            Self::RosterUpdate => "roster_update",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a wire label onto a kind.
    ///
    /// Labels are matched case-insensitively and `-` is treated as `_`, so
    /// `"DATA-REQUEST"` and `"data_request"` name the same kind. Anything
    /// unrecognised maps to [`EventKind::Unknown`].
    pub fn from_wire(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "connect" => Self::Connect,
            "connection_ack" | "connection_response" => Self::ConnectionAck,
            "ping" => Self::Ping,
            "ping_response" => Self::PingResponse,
            "data_request" => Self::DataRequest,
            "roster_update" => Self::RosterUpdate,
            _ => Self::Unknown,
        }
    }

    /// Whether only the relay may emit this kind.
    pub fn is_relay_only(self) -> bool {
        matches!(
            self,
            Self::ConnectionAck | Self::DataRequest | Self::RosterUpdate
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telemetry subscriptions a client may request with a `connect` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subscription {
    #[serde(rename = "telemetry")]
    Telemetry,
}

/// Payload of a client `connect` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Subscription>,
}

/// Payload of the `connection_ack` the relay sends on every new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAckPayload {
    /// The identifier the relay assigned to the connection.
    pub assigned_id: ClientId,
    /// The class of the registry the connection joined.
    pub client_type: ClientClass,
    /// Relay wall-clock time at the moment of acceptance.
    pub server_time: DateTime<Utc>,
}

/// Payload shared by `ping` and `ping_response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    /// The identifier of the addressee in the opposite registry.
    #[serde(alias = "target_client_id")]
    pub target_id: ClientId,
    /// Class of the client that originated the event, filled in by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_class: Option<ClientClass>,
}

/// Core clock speeds, in GHz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuFrequency {
    pub current_frequency: f64,
    pub max_frequency: f64,
}

/// A flat host metrics record pushed in `data_request` events.
///
/// Memory and disk sizes are in GB; percentages are 0–100.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cpu_count: usize,
    pub cpu_usage: f64,
    pub cpu_frequency: CpuFrequency,
    /// Sensor label to temperature in degrees Celsius.
    pub core_temperatures: BTreeMap<String, f64>,
    pub ram_total: f64,
    pub ram_available: f64,
    pub ram_percentage: f64,
    pub disk_total: f64,
    pub disk_free: f64,
    pub disk_used: f64,
    pub disk_percentage: f64,
}

/// Payload of a `roster_update`: the live origin identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPayload {
    pub clients: Vec<ClientId>,
}

/// The kind-specific part of an [`Event`].
///
/// Each variant carries exactly the payload type its kind requires, so a
/// mismatched kind/payload pair cannot be represented.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Connect(ConnectPayload),
    ConnectionAck(ConnectionAckPayload),
    Ping(PingPayload),
    PingResponse(PingPayload),
    DataRequest(StatsSnapshot),
    RosterUpdate(RosterPayload),
    /// A kind this build does not know. The received label and payload are
    /// kept for logging.
    Unknown {
        kind: String,
        payload: Option<Value>,
    },
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect(_) => EventKind::Connect,
            Self::ConnectionAck(_) => EventKind::ConnectionAck,
            Self::Ping(_) => EventKind::Ping,
            Self::PingResponse(_) => EventKind::PingResponse,
            Self::DataRequest(_) => EventKind::DataRequest,
            Self::RosterUpdate(_) => EventKind::RosterUpdate,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }

    /// Decodes a payload for the given wire label into the matching variant.
    pub(crate) fn decode(label: &str, payload: Option<Value>) -> Result<Self, ValidationError> {
        let kind = EventKind::from_wire(label);
        let body = match kind {
            EventKind::Connect => match payload {
                Some(Value::Null) | None => Self::Connect(ConnectPayload::default()),
                Some(value) => Self::Connect(decode_payload(kind, value)?),
            },
            EventKind::ConnectionAck => Self::ConnectionAck(require_payload(kind, payload)?),
            EventKind::Ping => Self::Ping(decode_ping(kind, payload)?),
            EventKind::PingResponse => Self::PingResponse(decode_ping(kind, payload)?),
            EventKind::DataRequest => Self::DataRequest(require_payload(kind, payload)?),
            EventKind::RosterUpdate => Self::RosterUpdate(require_payload(kind, payload)?),
            EventKind::Unknown => Self::Unknown {
                kind: label.to_string(),
                payload,
            },
        };
        Ok(body)
    }

    fn label(&self) -> &str {
        match self {
            Self::Unknown { kind, .. } => kind,
            other => other.kind().as_str(),
        }
    }

    fn payload_value(&self) -> Result<Option<Value>, serde_json::Error> {
        let value = match self {
            Self::Connect(p) if p.subscribe.is_none() => return Ok(None),
            Self::Connect(p) => serde_json::to_value(p)?,
            Self::ConnectionAck(p) => serde_json::to_value(p)?,
            Self::Ping(p) | Self::PingResponse(p) => serde_json::to_value(p)?,
            Self::DataRequest(p) => serde_json::to_value(p)?,
            Self::RosterUpdate(p) => serde_json::to_value(p)?,
            Self::Unknown { payload, .. } => return Ok(payload.clone()),
        };
        Ok(Some(value))
    }
}

fn require_payload<T: DeserializeOwned>(
    kind: EventKind,
    payload: Option<Value>,
) -> Result<T, ValidationError> {
    match payload {
        Some(Value::Null) | None => Err(ValidationError::MissingPayload { kind }),
        Some(value) => decode_payload(kind, value),
    }
}

fn decode_payload<T: DeserializeOwned>(kind: EventKind, value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Ping payloads are decoded loosely first so that a missing or blank target
/// reports [`ValidationError::MissingTarget`] rather than a serde message.
fn decode_ping(kind: EventKind, payload: Option<Value>) -> Result<PingPayload, ValidationError> {
    #[derive(Deserialize)]
    struct LoosePing {
        #[serde(default, alias = "target_client_id")]
        target_id: Option<String>,
        #[serde(default)]
        requester_class: Option<Value>,
    }

    let loose: LoosePing = require_payload(kind, payload)?;
    let target_id = match loose.target_id.map(ClientId::from) {
        Some(target) if !target.is_empty() => target,
        _ => return Err(ValidationError::MissingTarget { kind }),
    };
    // Relay-owned field; a value it cannot read is dropped, not rejected.
    let requester_class = loose
        .requester_class
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok());
    Ok(PingPayload {
        target_id,
        requester_class,
    })
}

/// The JSON envelope every frame travels in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_type: Option<ClientClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Inbound view of the envelope.
///
/// Only `event` is strict. The optional fields are kept raw and read on
/// demand, so a value the relay cannot interpret costs that field and not the
/// whole frame.
#[derive(Debug, Deserialize)]
pub(crate) struct InboundEnvelope {
    pub event: String,
    #[serde(default)]
    pub client_id: Option<Value>,
    #[serde(default)]
    pub client_type: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl InboundEnvelope {
    pub(crate) fn parse(raw: &str) -> Result<Self, ValidationError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub(crate) fn sender_id(&self) -> Option<ClientId> {
        self.client_id
            .as_ref()
            .and_then(Value::as_str)
            .map(ClientId::from)
    }

    /// The declared class, if it names one the relay knows.
    pub(crate) fn declared_class(&self) -> Option<ClientClass> {
        self.client_type
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub(crate) fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }
}

/// Parses an RFC 3339 timestamp. Timestamps without an offset are read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A typed event with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub sender_id: ClientId,
    pub sender_class: ClientClass,
    pub body: EventBody,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    /// Builds an event stamped with the current time.
    pub fn new(sender_id: ClientId, sender_class: ClientClass, body: EventBody) -> Self {
        Self {
            sender_id,
            sender_class,
            body,
            timestamp: Some(Utc::now()),
        }
    }

    /// Builds an event whose sender is the relay itself.
    pub fn from_relay(body: EventBody) -> Self {
        Self::new(ClientId::relay(), ClientClass::Relay, body)
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    /// Converts the event into its wire envelope.
    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        Ok(Envelope {
            event: self.body.label().to_string(),
            client_id: Some(self.sender_id.clone()),
            client_type: Some(self.sender_class),
            payload: self.body.payload_value()?,
            timestamp: self.timestamp,
        })
    }

    /// Serializes the event as a single JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }

    /// Decodes a frame structurally, trusting the sender fields it carries.
    ///
    /// This is the client-side view of the wire format: it checks kind and
    /// payload pairing but applies none of the relay's ingress policy. Use
    /// [`crate::validate`] for frames arriving on a relay connection.
    pub fn decode(raw: &str) -> Result<Self, ValidationError> {
        let envelope = InboundEnvelope::parse(raw)?;
        let sender_id = envelope.sender_id().ok_or(ValidationError::MissingSender)?;
        let sender_class = envelope
            .declared_class()
            .ok_or(ValidationError::MissingSender)?;
        let timestamp = envelope.timestamp();
        Ok(Self {
            sender_id,
            sender_class,
            body: EventBody::decode(&envelope.event, envelope.payload)?,
            timestamp,
        })
    }
}
