//! Dynamic server routing and failover across network areas.
//!
//! This crate picks a healthy server for a request out of a membership that
//! keeps changing underneath it:
//! - **Managers** own the ordered server list of one datacenter, rotate past
//!   failed servers and periodically rebalance with health probes
//! - **Router** indexes managers by network area and datacenter, finds routes
//!   and ranks datacenters by network distance
//! - **Membership events** from a gossip pool feed servers into the router
//!
//! # Features
//!
//! - Lock-free reads of the current server list from request paths
//! - Jittered rebalance intervals that scale with fleet size
//! - Fallback across areas when one path to a datacenter goes offline
//! - RTT-based datacenter ranking from network coordinates
//!
//! # Example
//!
//! ```rust,no_run
//! use switchyard::testing::{FaultPinger, MockCluster};
//! use switchyard::{AreaId, Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new(RouterConfig::new("dc1", "node1.dc1"));
//!
//!     let wan = MockCluster::new("node1.dc1");
//!     wan.add_member("dc2", "node1", None);
//!     router.add_area(AreaId::wan(), wan, FaultPinger::healthy())?;
//!
//!     if let Some((manager, server)) = router.find_route("dc2") {
//!         println!("Routing to {}", server);
//!         // On a failed request, move on to the next server.
//!         manager.notify_failed_server(&server);
//!     }
//!
//!     router.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────────┐
//! │ Gossip pools │────▶│ handle_member_events             │
//! └──────────────┘     └──────────────────────────────────┘
//!                                      │
//!                                      ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ Router                                               │
//! │  • areas: area -> (cluster, pinger, dc -> Manager)   │
//! │  • managers: dc -> [Manager] across areas            │
//! └──────────────────────────────────────────────────────┘
//!                                      │
//!                                      ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ Manager (one per area and datacenter)                │
//! │  • find_server / notify_failed_server                │
//! │  • rebalance loop on a jittered timer                │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod router;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use config::{RebalanceConfig, RouterConfig};
pub use error::{Error, MetadataError, Result};
pub use types::{AreaId, DatacenterMap, NodeCoordinate};

// Re-export cluster types
pub use cluster::{
    compute_distance, handle_member_events, ClusterSize, Coordinate, Member, MemberEvent,
    MemberStatus, RouterCluster, ServerEventHandler,
};

// Re-export server records
pub use metadata::{is_server, Server, ServerKey};

// Re-export routing types
pub use router::{
    rebalance_delay, Manager, NoOpServerTracker, Pinger, Rebalancer, Router, ServerList,
    ServerTracker,
};

// Re-export metrics types
pub use metrics::{Counter, RoutingMetrics, RoutingMetricsSnapshot};
