//! Courier relay server library logic.
//!
//! The relay keeps one [`registry::Registry`] per client class, forwards
//! pings between the origin and observer registries through the
//! [`router::RelayRouter`], keeps observers informed of origin membership via
//! the [`roster::RosterBroadcaster`], and streams host metrics to subscribers
//! through [`telemetry`].

pub mod api_ws;
pub mod config;
pub mod counters;
pub mod error;
pub mod interceptor;
pub mod registry;
pub mod roster;
pub mod router;
pub mod telemetry;

use axum::{routing::get, Extension, Json, Router};
use counters::RelayCounters;
use courier_stats::StatsCollector;
use courier_types::ClientClass;
use interceptor::{Interceptor, NoopInterceptor};
use registry::Registry;
use roster::RosterBroadcaster;
use router::RelayRouter;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers and sessions.
///
/// Built once at startup; every registry lives here rather than in globals.
#[derive(Clone)]
pub struct AppState {
    /// Connections on `/ws/origin`.
    pub origin: Registry,
    /// Connections on `/ws/observer`.
    pub observer: Registry,
    /// Telemetry-only connections on `/ws/stats`.
    pub stats: Registry,
    /// Ping forwarding between `origin` and `observer`.
    pub router: RelayRouter,
    /// Roster updates from `origin` to `observer`.
    pub roster: RosterBroadcaster,
    /// Source of telemetry snapshots.
    pub collector: Arc<dyn StatsCollector>,
    /// Delay between two telemetry snapshots for one subscriber.
    pub telemetry_interval: Duration,
    /// Routing counters reported by `/health`.
    pub counters: Arc<RelayCounters>,
    /// Ingress/dispatch hooks.
    pub interceptor: Arc<dyn Interceptor>,
}

impl AppState {
    pub fn new(collector: Arc<dyn StatsCollector>, telemetry_interval: Duration) -> Self {
        let origin = Registry::new(ClientClass::Origin);
        let observer = Registry::new(ClientClass::Observer);
        Self {
            router: RelayRouter::new(origin.clone(), observer.clone()),
            roster: RosterBroadcaster::new(origin.clone(), observer.clone()),
            origin,
            observer,
            stats: Registry::new(ClientClass::Relay),
            collector,
            telemetry_interval,
            counters: Arc::new(RelayCounters::new()),
            interceptor: Arc::new(NoopInterceptor),
        }
    }

    /// Replaces the ingress/dispatch interceptor.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// The registry that owns connections of `class`.
    pub fn registry(&self, class: ClientClass) -> &Registry {
        match class {
            ClientClass::Origin => &self.origin,
            ClientClass::Observer => &self.observer,
            ClientClass::Relay => &self.stats,
        }
    }
}

/// Health check handler.
///
/// Reports live connection counts per registry and routing counters.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": {
            "origin": state.origin.len().await,
            "observer": state.observer.len().await,
            "stats": state.stats.len().await,
        },
        "events": state.counters.snapshot(),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/origin", get(api_ws::origin_ws_handler))
        .route("/ws/observer", get(api_ws::observer_ws_handler))
        .route("/ws/stats", get(api_ws::stats_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use courier_stats::FixedCollector;
    use courier_types::StatsSnapshot;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(
            Arc::new(FixedCollector::new(StatsSnapshot::default())),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn health_check_reports_connection_counts() {
        let state = state();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.origin.connect(tx).await;
        let (tx, _rx2) = mpsc::unbounded_channel();
        state.stats.connect(tx).await;

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["connections"]["origin"], 1);
        assert_eq!(json["connections"]["observer"], 0);
        assert_eq!(json["connections"]["stats"], 1);
        assert_eq!(json["events"]["forwarded"], 0);
    }

    #[test]
    fn registry_lookup_by_class() {
        let state = state();
        assert_eq!(state.registry(ClientClass::Origin).class(), ClientClass::Origin);
        assert_eq!(state.registry(ClientClass::Observer).class(), ClientClass::Observer);
        assert_eq!(state.registry(ClientClass::Relay).class(), ClientClass::Relay);
    }
}
