//! Configuration types for the router and its managers.

use std::time::Duration;

/// Minimum time between two rebalances of the same manager.
pub const DEFAULT_MIN_REBALANCE_INTERVAL: Duration = Duration::from_secs(120);

/// Divisor applied to the minimum interval to get the maximum jitter.
/// A value of 2 spreads wakeups over `[min, 1.5 * min]`.
pub const DEFAULT_JITTER_FRACTION: u32 = 2;

/// Reconnections per second a single server is assumed to absorb.
pub const DEFAULT_CONNS_PER_SEC_PER_SERVER: u64 = 64;

/// Main configuration for a [`Router`](crate::Router).
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Name of the datacenter this node lives in.
    pub local_datacenter: String,

    /// Name of this node. Servers with this name are never pinged.
    pub server_name: String,

    /// Rebalance scheduling.
    pub rebalance: RebalanceConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local_datacenter: "dc1".to_string(),
            server_name: String::new(),
            rebalance: RebalanceConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Create a new configuration for the given datacenter and node name.
    pub fn new(local_datacenter: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            local_datacenter: local_datacenter.into(),
            server_name: server_name.into(),
            ..Default::default()
        }
    }

    /// Set the rebalance configuration.
    pub fn with_rebalance_config(mut self, rebalance: RebalanceConfig) -> Self {
        self.rebalance = rebalance;
        self
    }
}

/// Rebalance scheduling configuration.
///
/// See [`RebalanceConfig::delay`] for how these values combine.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceConfig {
    /// Floor for the delay between rebalances.
    pub min_interval: Duration,

    /// Jitter added at the floor is uniform in `[0, min_interval / jitter_fraction]`.
    pub jitter_fraction: u32,

    /// Sustainable reconnections per second per server.
    pub conns_per_sec_per_server: u64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_REBALANCE_INTERVAL,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            conns_per_sec_per_server: DEFAULT_CONNS_PER_SEC_PER_SERVER,
        }
    }
}

impl RebalanceConfig {
    /// Set the minimum rebalance interval.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Set the jitter fraction. Zero disables jitter.
    pub fn with_jitter_fraction(mut self, fraction: u32) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    /// Set the per-server reconnection rate.
    pub fn with_conns_per_sec_per_server(mut self, rate: u64) -> Self {
        self.conns_per_sec_per_server = rate;
        self
    }

    /// Delay before the next rebalance. See [`crate::router::scaled_delay`].
    pub fn delay(&self, server_count: usize, node_count: usize) -> Duration {
        crate::router::scaled_delay(self, server_count, node_count)
    }
}
