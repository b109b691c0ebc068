//! WebSocket endpoints and the per-connection session loop.

use crate::error::SessionEnd;
use crate::telemetry::spawn_publisher;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use courier_types::{validate, ClientClass, ClientId, ConnectPayload, EventBody, Subscription};
use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// `GET /ws/origin`: connections tracked in the roster.
pub async fn origin_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ClientClass::Origin))
}

/// `GET /ws/observer`: connections that receive rosters and ping origins.
pub async fn observer_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ClientClass::Observer))
}

/// `GET /ws/stats`: telemetry-only connections.
pub async fn stats_ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ClientClass::Relay))
}

/// Whether a `connect` event from a `class` connection starts telemetry.
///
/// Telemetry-only connections subscribe with any `connect`; origin and
/// observer connections must ask for it explicitly.
fn wants_telemetry(class: ClientClass, payload: &ConnectPayload) -> bool {
    class == ClientClass::Relay || payload.subscribe == Some(Subscription::Telemetry)
}

/// Runs one connection from handshake to teardown.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, class: ClientClass) {
    let registry = state.registry(class).clone();
    let (sender, mut receiver) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel::<String>();

    // The ack is queued before the connection becomes reachable.
    let ack = registry.connect(tx).await;
    let client_id = ack.assigned_id;

    let mut send_task = tokio::spawn(run_writer(sender, rx));

    match class {
        ClientClass::Origin => {
            state.roster.broadcast().await;
        }
        ClientClass::Observer => {
            state.roster.send_snapshot(&client_id).await;
        }
        ClientClass::Relay => {}
    }

    let mut telemetry: Option<JoinHandle<()>> = None;

    let end = loop {
        let next = tokio::select! {
            next = receiver.next() => next,
            written = &mut send_task => {
                break match written {
                    Ok(WriterEnd::SendFailed) => SessionEnd::WriteFailed,
                    Ok(WriterEnd::QueueClosed) | Err(_) => SessionEnd::WriterStopped,
                };
            }
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => break SessionEnd::Transport(e),
            None => break SessionEnd::StreamEnded,
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break SessionEnd::ClosedByPeer,
            _ => continue,
        };

        handle_frame(&state, &client_id, class, text.as_str(), &mut telemetry).await;
    };

    match &end {
        SessionEnd::Transport(_) | SessionEnd::WriteFailed => {
            tracing::warn!(client_id = %client_id, class = %class, "session ended: {}", end)
        }
        other => {
            tracing::debug!(client_id = %client_id, class = %class, "session ended: {}", other)
        }
    }

    if let Some(task) = telemetry {
        task.abort();
    }

    if registry.disconnect(&client_id).await && class == ClientClass::Origin {
        state.roster.broadcast().await;
    }
    send_task.abort();
}

/// Why a writer task stopped draining its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterEnd {
    /// Every sender of the queue is gone.
    QueueClosed,
    /// A write to the socket failed.
    SendFailed,
}

/// Drains `rx` into `sink` until the queue closes or a write fails.
///
/// The session waits on this task, so a failed write ends the session
/// without waiting for the read half.
async fn run_writer<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<String>) -> WriterEnd
where
    S: Sink<Message> + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if sink.send(Message::Text(frame.into())).await.is_err() {
            return WriterEnd::SendFailed;
        }
    }
    let _ = sink.close().await;
    WriterEnd::QueueClosed
}

/// Validates one inbound frame and hands it to the router.
async fn handle_frame(
    state: &AppState,
    client_id: &ClientId,
    class: ClientClass,
    raw: &str,
    telemetry: &mut Option<JoinHandle<()>>,
) {
    state.interceptor.on_ingress(client_id, class, raw);

    let event = match validate(raw, client_id, class) {
        Ok(event) => event,
        Err(e) => {
            state.counters.reject();
            tracing::warn!(client_id = %client_id, class = %class, "rejected frame: {}", e);
            state.interceptor.on_rejected(client_id, class, &e);
            return;
        }
    };

    if let EventBody::Connect(payload) = &event.body {
        if wants_telemetry(class, payload) {
            if telemetry.is_none() {
                *telemetry = Some(spawn_publisher(
                    state.registry(class).clone(),
                    client_id.clone(),
                    state.collector.clone(),
                    state.telemetry_interval,
                ));
            } else {
                tracing::debug!(client_id = %client_id, "telemetry already running; ignoring subscribe");
            }
        }
    }

    let kind = event.kind();
    let outcome = state.router.route(event).await;
    state.counters.record(&outcome);
    state.interceptor.on_dispatch(client_id, class, kind, &outcome);
}
