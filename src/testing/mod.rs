//! Test doubles for the routing layer.
//!
//! These stand in for the gossip pool, the health prober and the connection
//! balancer so routing behavior can be exercised without a network:
//!
//! - [`MockCluster`]: a gossip pool with scripted members and coordinates
//! - [`FaultPinger`]: a prober that fails chosen servers and counts probes
//! - [`CountingTracker`]: a connection balancer that counts notifications

use crate::cluster::{ClusterSize, Coordinate, Member, MemberStatus, RouterCluster};
use crate::error::{Error, Result};
use crate::metadata::{Server, SERVER_ROLE};
use crate::router::{Pinger, Rebalancer, ServerTracker};
use crate::types::AreaId;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default RPC port given to mock servers.
pub const MOCK_SERVER_PORT: u16 = 8300;

/// Build a server record with a loopback address derived from `index`.
pub fn test_server(name: &str, datacenter: &str, index: u8) -> Arc<Server> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, index)), MOCK_SERVER_PORT);
    Arc::new(Server::new(name, datacenter, addr))
}

/// A gossip pool whose members and coordinates are set by the test.
#[derive(Debug)]
pub struct MockCluster {
    local_name: String,
    members: RwLock<Vec<Member>>,
    coords: RwLock<HashMap<String, Coordinate>>,
    next_addr: AtomicUsize,
}

impl MockCluster {
    /// Create an empty pool for the node named `local_name`.
    pub fn new(local_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            local_name: local_name.into(),
            members: RwLock::new(Vec::new()),
            coords: RwLock::new(HashMap::new()),
            next_addr: AtomicUsize::new(1),
        })
    }

    /// Add a server member named `<name>.<datacenter>` and return its name.
    pub fn add_member(&self, datacenter: &str, name: &str, coord: Option<Coordinate>) -> String {
        let full_name = format!("{}.{}", name, datacenter);
        let idx = self.next_addr.fetch_add(1, Ordering::Relaxed);
        let high = u8::try_from(idx / 256).expect("mock cluster address space exhausted");
        let ip = Ipv4Addr::new(127, 0, high, (idx % 256) as u8);
        let member = Member::new(full_name.clone(), SocketAddr::new(IpAddr::V4(ip), 8301))
            .with_tag("role", SERVER_ROLE)
            .with_tag("dc", datacenter)
            .with_tag("port", &MOCK_SERVER_PORT.to_string())
            .with_tag("build", "1.0.0")
            .with_tag("vsn", "3");
        self.add_raw_member(member);
        if let Some(coord) = coord {
            self.set_coordinate(&full_name, coord);
        }
        full_name
    }

    /// Add a member exactly as given, without any tags added.
    pub fn add_raw_member(&self, member: Member) {
        self.members.write().push(member);
    }

    /// Change the status of every member with the given name.
    pub fn set_status(&self, name: &str, status: MemberStatus) {
        for member in self.members.write().iter_mut().filter(|m| m.name == name) {
            member.status = status;
        }
    }

    /// Set the cached coordinate of a member. Use the local name to set the
    /// pool's own coordinate.
    pub fn set_coordinate(&self, name: &str, coord: Coordinate) {
        self.coords.write().insert(name.to_string(), coord);
    }

    /// Parsed server record of a member.
    pub fn server(&self, name: &str) -> Option<Server> {
        self.members
            .read()
            .iter()
            .find(|m| m.name == name)
            .and_then(crate::metadata::is_server)
    }
}

impl ClusterSize for MockCluster {
    fn num_nodes(&self) -> usize {
        self.members.read().len()
    }
}

impl RouterCluster for MockCluster {
    fn members(&self) -> Vec<Member> {
        self.members.read().clone()
    }

    fn get_coordinate(&self) -> Result<Coordinate> {
        self.coords
            .read()
            .get(&self.local_name)
            .cloned()
            .ok_or_else(|| Error::Coordinate(format!("no coordinate for {}", self.local_name)))
    }

    fn get_cached_coordinate(&self, name: &str) -> Option<Coordinate> {
        self.coords.read().get(name).cloned()
    }
}

/// Fixed-size pool used where only the node count matters.
#[derive(Debug, Clone, Copy)]
pub struct FixedClusterSize(pub usize);

impl ClusterSize for FixedClusterSize {
    fn num_nodes(&self) -> usize {
        self.0
    }
}

/// A prober that fails chosen servers and records every probe.
#[derive(Debug, Default)]
pub struct FaultPinger {
    fail_all: bool,
    failing_addrs: RwLock<HashSet<SocketAddr>>,
    failing_names: RwLock<HashSet<String>>,
    pings: AtomicUsize,
}

impl FaultPinger {
    /// A prober that reports every server healthy.
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A prober that reports every server unhealthy.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_all: true,
            ..Default::default()
        })
    }

    pub fn fail_addr(&self, addr: SocketAddr) {
        self.failing_addrs.write().insert(addr);
    }

    pub fn fail_name(&self, name: &str) {
        self.failing_names.write().insert(name.to_string());
    }

    pub fn heal_name(&self, name: &str) {
        self.failing_names.write().remove(name);
    }

    /// Number of probes made so far.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::Relaxed)
    }

    fn is_failing(&self, node_name: &str, addr: SocketAddr) -> bool {
        self.fail_all
            || self.failing_addrs.read().contains(&addr)
            || self.failing_names.read().contains(node_name)
    }
}

#[async_trait::async_trait]
impl Pinger for FaultPinger {
    async fn ping(&self, _datacenter: &str, node_name: &str, addr: SocketAddr) -> Result<bool> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        Ok(!self.is_failing(node_name, addr))
    }
}

/// A prober whose probes always error out.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorPinger;

#[async_trait::async_trait]
impl Pinger for ErrorPinger {
    async fn ping(&self, _datacenter: &str, node_name: &str, _addr: SocketAddr) -> Result<bool> {
        Err(Error::Ping {
            server: node_name.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

/// A connection balancer that counts what it is told.
#[derive(Debug, Default)]
pub struct CountingTracker {
    rebalances: Arc<AtomicUsize>,
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl CountingTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rebalances(&self) -> usize {
        self.rebalances.load(Ordering::Relaxed)
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::Relaxed)
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
    }
}

impl ServerTracker for CountingTracker {
    fn new_rebalancer(&self, _datacenter: &str) -> Rebalancer {
        let rebalances = self.rebalances.clone();
        Arc::new(move || {
            rebalances.fetch_add(1, Ordering::Relaxed);
        })
    }

    fn add_server(&self, _area: &AreaId, _server: &Server) {
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    fn remove_server(&self, _area: &AreaId, _server: &Server) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }
}
