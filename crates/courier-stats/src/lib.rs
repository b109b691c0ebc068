//! Host metrics collection for the Courier telemetry stream.
//!
//! The relay only schedules and serializes snapshots; producing them is the
//! job of a [`StatsCollector`]. [`SystemCollector`] reads the local host via
//! `sysinfo`, and [`FixedCollector`] returns a constant record.

use courier_types::{CpuFrequency, StatsSnapshot};
use std::collections::BTreeMap;
use std::sync::Mutex;
use sysinfo::{Components, Disks, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Produces a metrics snapshot on demand.
///
/// Implementations may block; callers on an async runtime should invoke
/// [`StatsCollector::snapshot`] from the blocking pool.
pub trait StatsCollector: Send + Sync + 'static {
    fn snapshot(&self) -> StatsSnapshot;

    /// Whether [`StatsCollector::snapshot`] touches the OS and should run on
    /// the blocking pool.
    fn is_blocking(&self) -> bool {
        true
    }
}

/// Collector backed by the local host.
///
/// The `System` handle is kept between calls because CPU usage is computed
/// as the delta between two refreshes; the first snapshot reports 0%.
pub struct SystemCollector {
    system: Mutex<System>,
}

impl SystemCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector for SystemCollector {
    fn snapshot(&self) -> StatsSnapshot {
        let mut sys = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("system stats lock poisoned; continuing with last state");
                poisoned.into_inner()
            }
        };
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpus = sys.cpus();
        let max_mhz = cpus.iter().map(|c| c.frequency()).max().unwrap_or(0);
        let avg_mhz = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.frequency() as f64).sum::<f64>() / cpus.len() as f64
        };

        let ram_total = sys.total_memory() as f64;
        let ram_available = sys.available_memory() as f64;

        let (disk_total, disk_free) = Disks::new_with_refreshed_list()
            .iter()
            .fold((0u64, 0u64), |(total, free), disk| {
                (total + disk.total_space(), free + disk.available_space())
            });
        let disk_total = disk_total as f64;
        let disk_free = disk_free as f64;

        let core_temperatures: BTreeMap<String, f64> = Components::new_with_refreshed_list()
            .iter()
            .map(|c| (c.label().to_string(), round_to(c.temperature() as f64, 1)))
            .collect();

        StatsSnapshot {
            cpu_count: cpus.len(),
            cpu_usage: round_to(sys.global_cpu_info().cpu_usage() as f64, 1),
            cpu_frequency: CpuFrequency {
                current_frequency: round_to(avg_mhz / 1000.0, 1),
                max_frequency: round_to(max_mhz as f64 / 1000.0, 1),
            },
            core_temperatures,
            ram_total: gigabytes(ram_total),
            ram_available: gigabytes(ram_available),
            ram_percentage: percentage(ram_total - ram_available, ram_total),
            disk_total: gigabytes(disk_total),
            disk_free: gigabytes(disk_free),
            disk_used: gigabytes(disk_total - disk_free),
            disk_percentage: percentage(disk_total - disk_free, disk_total),
        }
    }
}

/// Collector that always returns the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct FixedCollector {
    snapshot: StatsSnapshot,
}

impl FixedCollector {
    pub fn new(snapshot: StatsSnapshot) -> Self {
        Self { snapshot }
    }
}

impl StatsCollector for FixedCollector {
    fn snapshot(&self) -> StatsSnapshot {
        self.snapshot.clone()
    }

    fn is_blocking(&self) -> bool {
        false
    }
}

fn gigabytes(bytes: f64) -> f64 {
    round_to(bytes / BYTES_PER_GB, 2)
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    round_to(part / whole * 100.0, 1)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
