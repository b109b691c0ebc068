//! Relay-wide event counters reported by `/health`.

use crate::router::RouteOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayCounters {
    forwarded: AtomicU64,
    dropped: AtomicU64,
    recorded: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`RelayCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub forwarded: u64,
    pub dropped: u64,
    pub recorded: u64,
    pub rejected: u64,
}

impl RelayCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &RouteOutcome) {
        let counter = match outcome {
            RouteOutcome::Forwarded { .. } => &self.forwarded,
            RouteOutcome::Dropped { .. } => &self.dropped,
            RouteOutcome::Recorded => &self.recorded,
            RouteOutcome::Ignored => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
