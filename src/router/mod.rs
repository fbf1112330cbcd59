//! Area-aware routing to healthy servers.
//!
//! The [`Router`] tracks a set of network areas. Each area is one gossip pool
//! whose server members are grouped by datacenter, with one [`Manager`] per
//! (area, datacenter) pair. A secondary index from datacenter to managers
//! spans all areas, so a datacenter reachable through several areas can fall
//! back from one path to the next.
//!
//! # Locking
//!
//! All router state sits behind one `RwLock`. Queries take the read lock;
//! adding or removing areas and servers, and shutdown, take the write lock.
//! The lock is never held across an `.await`, and managers never call back
//! into the router.

mod manager;
mod pinger;
mod rebalance;
mod server_list;

pub use manager::Manager;
pub use pinger::{noop_rebalancer, NoOpServerTracker, Pinger, Rebalancer, ServerTracker};
pub use rebalance::{rebalance_delay, scaled_delay};
pub use server_list::ServerList;

use crate::cluster::{compute_distance, MemberStatus, RouterCluster};
use crate::config::{RebalanceConfig, RouterConfig};
use crate::error::{Error, Result};
use crate::metadata::{is_server, Server};
use crate::metrics::RoutingMetrics;
use crate::types::{AreaId, DatacenterMap, NodeCoordinate};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A manager together with the token that stops its rebalance loop.
struct ManagerInfo {
    manager: Arc<Manager>,
    shutdown: CancellationToken,
}

/// State for one network area.
struct AreaInfo {
    cluster: Arc<dyn RouterCluster>,
    pinger: Arc<dyn Pinger>,
    /// Managers for the datacenters seen in this area.
    managers: HashMap<String, ManagerInfo>,
    use_tls: bool,
}

#[derive(Default)]
struct RouterState {
    areas: HashMap<AreaId, AreaInfo>,
    /// Datacenter to managers across all areas, in registration order.
    managers: HashMap<String, Vec<Arc<Manager>>>,
    is_shutdown: bool,
}

impl RouterState {
    /// Take a manager out of the datacenter index.
    ///
    /// # Panics
    ///
    /// Panics if the manager is not indexed, which means the area and
    /// datacenter indexes have diverged.
    fn remove_manager_from_index(&mut self, datacenter: &str, manager: &Arc<Manager>) {
        let managers = self
            .managers
            .get_mut(datacenter)
            .expect("managers index out of sync");
        let idx = managers
            .iter()
            .position(|m| Arc::ptr_eq(m, manager))
            .expect("managers index out of sync");
        managers.remove(idx);
        if managers.is_empty() {
            self.managers.remove(datacenter);
        }
    }
}

/// Routes requests to healthy servers by datacenter across network areas.
pub struct Router {
    /// Servers in this datacenter are treated as zero RTT away.
    local_datacenter: String,

    /// This node's name, never pinged by managers.
    server_name: String,

    rebalance_config: RebalanceConfig,
    tracker: Arc<dyn ServerTracker>,
    metrics: Arc<RoutingMetrics>,

    state: RwLock<RouterState>,
}

impl Router {
    /// Create a router with no areas.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            local_datacenter: config.local_datacenter,
            server_name: config.server_name,
            rebalance_config: config.rebalance,
            tracker: Arc::new(NoOpServerTracker),
            metrics: Arc::new(RoutingMetrics::new()),
            state: RwLock::new(RouterState::default()),
        }
    }

    /// Notify `tracker` of server changes and rebalances.
    pub fn with_server_tracker(mut self, tracker: Arc<dyn ServerTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn local_datacenter(&self) -> &str {
        &self.local_datacenter
    }

    /// Counters shared by this router and its managers.
    pub fn metrics(&self) -> &Arc<RoutingMetrics> {
        &self.metrics
    }

    /// Stop every manager and drop all areas. No areas can be added
    /// afterwards.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        let areas = std::mem::take(&mut state.areas);
        for (_, area) in areas {
            for (datacenter, info) in area.managers {
                state.remove_manager_from_index(&datacenter, &info.manager);
                info.shutdown.cancel();
                self.metrics.managers_destroyed.inc();
            }
        }
        state.is_shutdown = true;
        info!("Router shut down");
    }

    /// Register a network area.
    ///
    /// Must be called from within a Tokio runtime, since managers start their
    /// rebalance loops here.
    pub fn add_area(
        &self,
        area_id: AreaId,
        cluster: Arc<dyn RouterCluster>,
        pinger: Arc<dyn Pinger>,
    ) -> Result<()> {
        self.add_area_with_tls(area_id, cluster, pinger, false)
    }

    /// Register a network area whose servers are dialed over TLS when
    /// `use_tls` is set.
    pub fn add_area_with_tls(
        &self,
        area_id: AreaId,
        cluster: Arc<dyn RouterCluster>,
        pinger: Arc<dyn Pinger>,
        use_tls: bool,
    ) -> Result<()> {
        let mut state = self.state.write();
        if state.is_shutdown {
            return Err(Error::RouterShutdown);
        }
        if state.areas.contains_key(&area_id) {
            return Err(Error::AreaExists(area_id));
        }

        let mut area = AreaInfo {
            cluster: cluster.clone(),
            pinger,
            managers: HashMap::new(),
            use_tls,
        };

        // The LAN area always has a manager for the local datacenter, even
        // before any server shows up.
        if area_id.is_lan() {
            info!("Initializing LAN area manager");
            self.maybe_initialize_manager(&mut state.managers, &mut area, &self.local_datacenter);
        }

        // Populate from the current members so routing works before the
        // first membership event arrives. Unreachable servers are detected
        // by the first rebalance.
        for member in cluster.members() {
            let Some(server) = is_server(&member) else {
                if !area_id.is_lan() {
                    warn!(non_server = %member.name, area = %area_id, "Non-server in server-only area");
                }
                continue;
            };
            self.add_server_locked(&mut state.managers, &area_id, &mut area, server);
        }

        info!(area = %area_id, tls = use_tls, "Added area");
        state.areas.insert(area_id, area);
        Ok(())
    }

    /// Remove a network area and stop all of its managers.
    pub fn remove_area(&self, area_id: &AreaId) -> Result<()> {
        let mut state = self.state.write();
        let area = state
            .areas
            .remove(area_id)
            .ok_or_else(|| Error::AreaNotFound(area_id.clone()))?;

        for (datacenter, info) in area.managers {
            state.remove_manager_from_index(&datacenter, &info.manager);
            info.shutdown.cancel();
            self.metrics.managers_destroyed.inc();
        }

        info!(area = %area_id, "Removed area");
        Ok(())
    }

    /// Whether servers in the area are dialed over TLS.
    pub fn tls_enabled(&self, area_id: &AreaId) -> Result<bool> {
        let state = self.state.read();
        state
            .areas
            .get(area_id)
            .map(|area| area.use_tls)
            .ok_or_else(|| Error::AreaNotFound(area_id.clone()))
    }

    /// Return the manager for `datacenter` in `area`, creating and starting
    /// it if this is the first server seen there.
    fn maybe_initialize_manager(
        &self,
        index: &mut HashMap<String, Vec<Arc<Manager>>>,
        area: &mut AreaInfo,
        datacenter: &str,
    ) -> Arc<Manager> {
        if let Some(info) = area.managers.get(datacenter) {
            return info.manager.clone();
        }

        let shutdown = CancellationToken::new();
        let rebalancer = self.tracker.new_rebalancer(datacenter);
        let manager = Arc::new(
            Manager::new(
                shutdown.clone(),
                area.cluster.clone(),
                area.pinger.clone(),
                self.server_name.clone(),
                Some(rebalancer),
            )
            .with_rebalance_config(self.rebalance_config.clone())
            .with_metrics(self.metrics.clone()),
        );

        area.managers.insert(
            datacenter.to_string(),
            ManagerInfo {
                manager: manager.clone(),
                shutdown,
            },
        );
        index
            .entry(datacenter.to_string())
            .or_default()
            .push(manager.clone());
        self.metrics.managers_created.inc();
        debug!(datacenter, "Created server manager");

        tokio::spawn(manager.clone().run());
        manager
    }

    fn add_server_locked(
        &self,
        index: &mut HashMap<String, Vec<Arc<Manager>>>,
        area_id: &AreaId,
        area: &mut AreaInfo,
        mut server: Server,
    ) {
        let manager = self.maybe_initialize_manager(index, area, &server.datacenter);

        // Let the manager and tracker know to dial this server over TLS.
        if area.use_tls {
            server.use_tls = true;
        }

        self.tracker.add_server(area_id, &server);
        manager.add_server(Arc::new(server));
    }

    /// Add or refresh a server in an area. Typically driven by join and
    /// update events from the area's gossip pool.
    pub fn add_server(&self, area_id: &AreaId, server: Server) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let area = state
            .areas
            .get_mut(area_id)
            .ok_or_else(|| Error::AreaNotFound(area_id.clone()))?;
        self.add_server_locked(&mut state.managers, area_id, area, server);
        Ok(())
    }

    /// Remove a server from an area. A manager left without servers is
    /// stopped and dropped from the routing table.
    pub fn remove_server(&self, area_id: &AreaId, server: &Server) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let area = state
            .areas
            .get_mut(area_id)
            .ok_or_else(|| Error::AreaNotFound(area_id.clone()))?;

        // Membership events race with manager teardown, so a missing
        // manager is not an error.
        let Some(info) = area.managers.get(&server.datacenter) else {
            return Ok(());
        };
        info.manager.remove_server(server);
        self.tracker.remove_server(area_id, server);

        if info.manager.num_servers() == 0 {
            if let Some(info) = area.managers.remove(&server.datacenter) {
                state.remove_manager_from_index(&server.datacenter, &info.manager);
                info.shutdown.cancel();
                self.metrics.managers_destroyed.inc();
                debug!(datacenter = %server.datacenter, area = %area_id, "Removed empty server manager");
            }
        }
        Ok(())
    }

    /// Shift traffic away from a failed server. The server stays known and
    /// can be selected again after the next rebalance.
    pub fn fail_server(&self, area_id: &AreaId, server: &Server) -> Result<()> {
        let state = self.state.read();
        let area = state
            .areas
            .get(area_id)
            .ok_or_else(|| Error::AreaNotFound(area_id.clone()))?;

        if let Some(info) = area.managers.get(&server.datacenter) {
            info.manager.notify_failed_server(server);
        }
        Ok(())
    }

    /// Find a server for `datacenter`.
    ///
    /// Managers reaching the datacenter are tried in registration order,
    /// skipping offline ones. The server returned may still be unhealthy; if
    /// a request to it fails, report it through the returned manager's
    /// [`Manager::notify_failed_server`].
    pub fn find_route(&self, datacenter: &str) -> Option<(Arc<Manager>, Arc<Server>)> {
        let state = self.state.read();
        let managers = state.managers.get(datacenter)?;

        managers
            .iter()
            .filter(|m| !m.is_offline())
            .find_map(|m| m.find_server().map(|s| (m.clone(), s)))
    }

    /// The LAN manager for the local datacenter and its preferred server.
    pub fn find_lan_route(&self) -> Option<(Arc<Manager>, Option<Arc<Server>>)> {
        let manager = self.get_lan_manager()?;
        let server = manager.find_server();
        Some((manager, server))
    }

    /// A server in the local datacenter, if any is known.
    pub fn find_lan_server(&self) -> Option<Arc<Server>> {
        self.find_lan_route().and_then(|(_, server)| server)
    }

    /// The manager for the local datacenter in the LAN area.
    pub fn get_lan_manager(&self) -> Option<Arc<Manager>> {
        let state = self.state.read();
        state
            .areas
            .get(&AreaId::lan())?
            .managers
            .get(&self.local_datacenter)
            .map(|info| info.manager.clone())
    }

    /// Server record for the given datacenter and RPC address.
    pub fn get_server_metadata_by_addr(&self, datacenter: &str, addr: &str) -> Option<Arc<Server>> {
        let state = self.state.read();
        state.managers.get(datacenter)?.iter().find_map(|m| {
            m.servers()
                .into_iter()
                .find(|s| s.addr.to_string() == addr)
        })
    }

    /// Call `f` on every server of every manager for `datacenter`, stopping
    /// at the first `false`.
    pub fn check_servers<F>(&self, datacenter: &str, mut f: F)
    where
        F: FnMut(&Server) -> bool,
    {
        let state = self.state.read();
        let Some(managers) = state.managers.get(datacenter) else {
            return;
        };

        for manager in managers {
            if !manager.check_servers(&mut f) {
                return;
            }
        }
    }

    /// Known datacenters, sorted by name.
    pub fn get_datacenters(&self) -> Vec<String> {
        let state = self.state.read();
        let mut dcs: Vec<String> = state.managers.keys().cloned().collect();
        dcs.sort();
        dcs
    }

    /// Known datacenters other than `local`, sorted by name.
    pub fn get_remote_datacenters(&self, local: &str) -> Vec<String> {
        let state = self.state.read();
        let mut dcs: Vec<String> = state
            .managers
            .keys()
            .filter(|dc| dc.as_str() != local)
            .cloned()
            .collect();
        dcs.sort();
        dcs
    }

    /// Whether any area reaches `datacenter`.
    pub fn has_datacenter(&self, datacenter: &str) -> bool {
        self.state.read().managers.contains_key(datacenter)
    }

    /// Known datacenters sorted by the median RTT from this node to their
    /// servers, nearest first. A datacenter reachable through several areas
    /// uses its lowest median. Ties are broken by name.
    pub fn get_datacenters_by_distance(&self) -> Result<Vec<String>> {
        let state = self.state.read();

        let mut dcs: HashMap<String, f64> = HashMap::new();
        for (area_id, area) in &state.areas {
            let coord = area.cluster.get_coordinate()?;

            let mut index: HashMap<String, Vec<f64>> = HashMap::new();
            for member in area.cluster.members() {
                let Some(server) = self.routable_member(area_id, &member, "get_datacenters_by_distance")
                else {
                    continue;
                };

                let rtt = if server.datacenter == self.local_datacenter {
                    0.0
                } else {
                    let other = area.cluster.get_cached_coordinate(&server.name);
                    compute_distance(Some(&coord), other.as_ref())
                };
                index.entry(server.datacenter).or_default().push(rtt);
            }

            for (dc, mut rtts) in index {
                rtts.sort_by(f64::total_cmp);
                let median = rtts[rtts.len() / 2];
                dcs.entry(dc)
                    .and_modify(|best| {
                        if median < *best {
                            *best = median;
                        }
                    })
                    .or_insert(median);
            }
        }

        let mut names: Vec<(String, f64)> = dcs.into_iter().collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(names.into_iter().map(|(dc, _)| dc).collect())
    }

    /// Raw coordinates of every known server, grouped by area and datacenter.
    pub fn get_datacenter_maps(&self) -> Result<Vec<DatacenterMap>> {
        let state = self.state.read();

        let mut maps = Vec::new();
        for (area_id, area) in &state.areas {
            let mut index: HashMap<String, Vec<NodeCoordinate>> = HashMap::new();
            for member in area.cluster.members() {
                let Some(server) = self.routable_member(area_id, &member, "get_datacenter_maps")
                else {
                    continue;
                };

                if let Some(coord) = area.cluster.get_cached_coordinate(&server.name) {
                    index.entry(server.datacenter).or_default().push(NodeCoordinate {
                        node: server.name,
                        coord,
                    });
                }
            }

            maps.extend(index.into_iter().map(|(datacenter, coordinates)| DatacenterMap {
                datacenter,
                area_id: area_id.clone(),
                coordinates,
            }));
        }
        Ok(maps)
    }

    /// Parse a member for distance calculations, skipping non-servers and
    /// servers that have left.
    fn routable_member(
        &self,
        area_id: &AreaId,
        member: &crate::cluster::Member,
        func: &'static str,
    ) -> Option<Server> {
        let Some(server) = is_server(member) else {
            if !area_id.is_lan() {
                warn!(non_server = %member.name, area = %area_id, func, "Non-server in server-only area");
            }
            return None;
        };

        if member.status == MemberStatus::Left {
            debug!(server = %member.name, area = %area_id, func, "Server in area left, skipping");
            return None;
        }
        Some(server)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Router")
            .field("local_datacenter", &self.local_datacenter)
            .field("areas", &state.areas.keys().collect::<Vec<_>>())
            .field("datacenters", &state.managers.keys().collect::<Vec<_>>())
            .field("is_shutdown", &state.is_shutdown)
            .finish()
    }
}
