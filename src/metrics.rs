//! In-process routing metrics.
//!
//! Counters are plain atomics shared by the router and all of its managers.
//! Call [`RoutingMetrics::snapshot`] to read a consistent-enough view for
//! export or assertions.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters describing routing activity.
#[derive(Debug)]
pub struct RoutingMetrics {
    /// Rebalances that found a healthy server.
    pub rebalances: Counter,
    /// Rebalances that found no healthy server.
    pub rebalance_failures: Counter,
    /// Rebalances whose previously selected server was removed meanwhile.
    pub reconcile_conflicts: Counter,
    /// Failure reports that rotated a server list.
    pub failed_server_rotations: Counter,
    /// Servers added to a manager.
    pub servers_added: Counter,
    /// Servers removed from a manager.
    pub servers_removed: Counter,
    /// Managers created.
    pub managers_created: Counter,
    /// Managers destroyed.
    pub managers_destroyed: Counter,
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingMetrics {
    pub const fn new() -> Self {
        Self {
            rebalances: Counter::new("router_rebalances_total"),
            rebalance_failures: Counter::new("router_rebalance_failures_total"),
            reconcile_conflicts: Counter::new("router_reconcile_conflicts_total"),
            failed_server_rotations: Counter::new("router_failed_server_rotations_total"),
            servers_added: Counter::new("router_servers_added_total"),
            servers_removed: Counter::new("router_servers_removed_total"),
            managers_created: Counter::new("router_managers_created_total"),
            managers_destroyed: Counter::new("router_managers_destroyed_total"),
        }
    }

    pub fn snapshot(&self) -> RoutingMetricsSnapshot {
        RoutingMetricsSnapshot {
            rebalances: self.rebalances.get(),
            rebalance_failures: self.rebalance_failures.get(),
            reconcile_conflicts: self.reconcile_conflicts.get(),
            failed_server_rotations: self.failed_server_rotations.get(),
            servers_added: self.servers_added.get(),
            servers_removed: self.servers_removed.get(),
            managers_created: self.managers_created.get(),
            managers_destroyed: self.managers_destroyed.get(),
        }
    }

    /// Number of managers currently alive.
    pub fn active_managers(&self) -> u64 {
        self.managers_created
            .get()
            .saturating_sub(self.managers_destroyed.get())
    }
}

/// Point-in-time copy of [`RoutingMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingMetricsSnapshot {
    pub rebalances: u64,
    pub rebalance_failures: u64,
    pub reconcile_conflicts: u64,
    pub failed_server_rotations: u64,
    pub servers_added: u64,
    pub servers_removed: u64,
    pub managers_created: u64,
    pub managers_destroyed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_total");
        assert_eq!(counter.name(), "test_total");
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_snapshot_and_active_managers() {
        let metrics = RoutingMetrics::new();
        metrics.managers_created.inc();
        metrics.managers_created.inc();
        metrics.managers_destroyed.inc();
        metrics.rebalances.inc();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.managers_created, 2);
        assert_eq!(snapshot.rebalances, 1);
        assert_eq!(metrics.active_managers(), 1);
    }
}
