//! Per-connection telemetry publisher.

use crate::registry::{Delivery, Registry};
use courier_stats::StatsCollector;
use courier_types::{ClientId, Event, EventBody, StatsSnapshot};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Starts the publisher loop for one subscribed connection.
pub fn spawn_publisher(
    registry: Registry,
    client_id: ClientId,
    collector: Arc<dyn StatsCollector>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run_publisher(registry, client_id, collector, interval))
}

/// Collects a snapshot, sends it as a `data_request`, sleeps for `interval`,
/// and repeats until a send does not reach the subscriber.
///
/// There is no retry: once the connection is gone the loop ends for good.
pub async fn run_publisher(
    registry: Registry,
    client_id: ClientId,
    collector: Arc<dyn StatsCollector>,
    interval: Duration,
) {
    tracing::info!(
        client_id = %client_id,
        interval_ms = interval.as_millis() as u64,
        "starting telemetry publisher"
    );

    let mut emitted: u64 = 0;
    loop {
        let Some(snapshot) = collect(&collector).await else {
            break;
        };

        let event = Event::from_relay(EventBody::DataRequest(snapshot));
        match registry.send(&client_id, &event).await {
            Delivery::Sent => emitted += 1,
            outcome => {
                tracing::info!(
                    client_id = %client_id,
                    emitted,
                    ?outcome,
                    "subscriber unreachable; stopping telemetry publisher"
                );
                return;
            }
        }

        sleep(interval).await;
    }

    tracing::warn!(client_id = %client_id, emitted, "telemetry publisher stopped: collector failed");
}

async fn collect(collector: &Arc<dyn StatsCollector>) -> Option<StatsSnapshot> {
    if !collector.is_blocking() {
        return Some(collector.snapshot());
    }

    let collector = collector.clone();
    match tokio::task::spawn_blocking(move || collector.snapshot()).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::error!("stats collection task panicked or was cancelled: {}", e);
            None
        }
    }
}
