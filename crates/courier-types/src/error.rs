//! Error types for event validation.

use crate::event::EventKind;
use crate::ClientClass;

/// Reasons a frame is rejected at ingress.
///
/// A rejected frame is dropped on its own; the connection that sent it stays
/// open.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The frame is not a JSON envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The kind requires a payload and none was given.
    #[error("{kind} event requires a payload")]
    MissingPayload { kind: EventKind },

    /// The payload does not match the shape the kind requires.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: EventKind, reason: String },

    /// A ping or ping response without a usable `target_id`.
    #[error("{kind} event requires a non-empty target_id")]
    MissingTarget { kind: EventKind },

    /// The sender's class may not originate this kind.
    #[error("{class} clients may not send {kind} events")]
    ClassNotPermitted { kind: EventKind, class: ClientClass },

    /// Only the relay emits this kind.
    #[error("{0} events are emitted by the relay only")]
    RelayOnlyKind(EventKind),

    /// The envelope declares a class other than the connection's.
    #[error("declared client_type {declared} does not match connection class {actual}")]
    ClassMismatch {
        declared: ClientClass,
        actual: ClientClass,
    },

    /// The envelope lacks `client_id` or `client_type`.
    #[error("event is missing its sender")]
    MissingSender,
}
