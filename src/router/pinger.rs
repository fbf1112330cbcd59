//! Collaborator hooks used by managers: health probing and connection
//! balancing.

use crate::error::Result;
use crate::metadata::Server;
use crate::types::AreaId;
use std::net::SocketAddr;
use std::sync::Arc;

/// Health prober for servers.
///
/// Probes run only from a manager's rebalance, on its background task, so a
/// slow prober delays that manager's next rebalance and nothing else.
#[async_trait::async_trait]
pub trait Pinger: Send + Sync + 'static {
    /// Check whether the server at `addr` is usable. An error counts as
    /// unhealthy.
    async fn ping(&self, datacenter: &str, node_name: &str, addr: SocketAddr) -> Result<bool>;
}

/// Callback run after every successful rebalance.
pub type Rebalancer = Arc<dyn Fn() + Send + Sync>;

/// A rebalancer that does nothing.
pub fn noop_rebalancer() -> Rebalancer {
    Arc::new(|| {})
}

/// Hook for an external connection balancer that wants to follow the
/// router's view of servers.
pub trait ServerTracker: Send + Sync + 'static {
    /// Callback to run whenever the manager for `datacenter` rebalances.
    fn new_rebalancer(&self, datacenter: &str) -> Rebalancer;

    /// A server was added through the given area.
    fn add_server(&self, area: &AreaId, server: &Server);

    /// A server was removed through the given area.
    fn remove_server(&self, area: &AreaId, server: &Server);
}

/// Tracker that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpServerTracker;

impl ServerTracker for NoOpServerTracker {
    fn new_rebalancer(&self, _datacenter: &str) -> Rebalancer {
        noop_rebalancer()
    }

    fn add_server(&self, _area: &AreaId, _server: &Server) {}

    fn remove_server(&self, _area: &AreaId, _server: &Server) {}
}
