//! Rebalance interval scheduling.
//!
//! Rebalancing makes every node reconnect to a random healthy server. In a
//! large pool, doing that on a fixed timer synchronizes the whole fleet, so
//! the interval grows with the pool size until the aggregate reconnection
//! rate fits what the servers can absorb. At the floor the delay is jittered
//! so managers created together do not wake together.

use crate::config::RebalanceConfig;
use rand::Rng;
use std::time::Duration;

/// Delay before the next rebalance using the default configuration.
pub fn rebalance_delay(server_count: usize, node_count: usize) -> Duration {
    scaled_delay(&RebalanceConfig::default(), server_count, node_count)
}

/// Delay before the next rebalance.
///
/// With `server_count` servers each absorbing `conns_per_sec_per_server`
/// reconnections per second, `node_count` clients need
/// `node_count / (server_count * rate)` seconds to all reconnect once. That
/// value is returned as-is when it exceeds the floor. Otherwise, or when
/// there are no servers, the result is uniform in
/// `[min_interval, min_interval + min_interval / jitter_fraction]`.
pub fn scaled_delay(config: &RebalanceConfig, server_count: usize, node_count: usize) -> Duration {
    let rate = (server_count as u128) * u128::from(config.conns_per_sec_per_server);
    if rate == 0 {
        return jittered_floor(config);
    }

    let nanos = (node_count as u128) * 1_000_000_000 / rate;
    let interval = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
    if interval < config.min_interval {
        return jittered_floor(config);
    }
    interval
}

fn jittered_floor(config: &RebalanceConfig) -> Duration {
    if config.jitter_fraction == 0 {
        return config.min_interval;
    }
    let max_jitter = config.min_interval / config.jitter_fraction;
    config.min_interval + random_stagger(max_jitter)
}

/// Uniform duration in `[0, max]`.
fn random_stagger(max: Duration) -> Duration {
    let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::rng().random_range(0..=max_nanos))
}
