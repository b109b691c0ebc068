//! Hooks around event ingress and dispatch.
//!
//! Interceptors see every inbound frame and every routing decision but cannot
//! change them. The relay installs [`NoopInterceptor`] unless
//! `logging.trace_events` is set, in which case [`TracingInterceptor`] logs
//! the full call/response flow.

use crate::router::RouteOutcome;
use courier_types::{ClientClass, ClientId, EventKind, ValidationError};

pub trait Interceptor: Send + Sync + 'static {
    /// Called with the raw text of each inbound frame, before validation.
    fn on_ingress(&self, _client_id: &ClientId, _class: ClientClass, _raw: &str) {}

    /// Called when a frame fails validation.
    fn on_rejected(&self, _client_id: &ClientId, _class: ClientClass, _error: &ValidationError) {}

    /// Called after the router has handled a valid event.
    fn on_dispatch(
        &self,
        _client_id: &ClientId,
        _class: ClientClass,
        _kind: EventKind,
        _outcome: &RouteOutcome,
    ) {
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterceptor;

impl Interceptor for NoopInterceptor {}

/// Logs every frame and routing decision through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
    fn on_ingress(&self, client_id: &ClientId, class: ClientClass, raw: &str) {
        tracing::debug!(client_id = %client_id, class = %class, frame = raw, "inbound frame");
    }

    fn on_rejected(&self, client_id: &ClientId, class: ClientClass, error: &ValidationError) {
        tracing::debug!(client_id = %client_id, class = %class, error = %error, "frame rejected");
    }

    fn on_dispatch(
        &self,
        client_id: &ClientId,
        class: ClientClass,
        kind: EventKind,
        outcome: &RouteOutcome,
    ) {
        match outcome {
            RouteOutcome::Forwarded { target } => tracing::info!(
                client_id = %client_id,
                class = %class,
                kind = %kind,
                target_id = %target,
                "dispatch: forwarded"
            ),
            RouteOutcome::Dropped { target } => tracing::info!(
                client_id = %client_id,
                class = %class,
                kind = %kind,
                target_id = %target,
                "dispatch: dropped"
            ),
            RouteOutcome::Ignored | RouteOutcome::Recorded => tracing::debug!(
                client_id = %client_id,
                class = %class,
                kind = %kind,
                outcome = ?outcome,
                "dispatch"
            ),
        }
    }
}
