//! Per-datacenter server manager.
//!
//! A [`Manager`] owns the ordered list of servers for one (area, datacenter)
//! pair. Request paths read the head of the list with [`Manager::find_server`]
//! and report failures with [`Manager::notify_failed_server`]; the membership
//! adapter adds and removes servers; a background task periodically shuffles
//! the list and rotates it to a healthy head.
//!
//! # Snapshots
//!
//! The list is never edited in place. Every change builds a new
//! [`ServerList`] and swaps it into `servers`, so readers always see a whole
//! list. Writers are serialized by `list_lock`; readers only take the brief
//! read lock needed to clone the `Arc`.

use crate::cluster::ClusterSize;
use crate::config::RebalanceConfig;
use crate::metadata::Server;
use crate::metrics::RoutingMetrics;
use crate::router::pinger::{noop_rebalancer, Pinger, Rebalancer};
use crate::router::server_list::ServerList;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Routes requests for one datacenter to a healthy server.
pub struct Manager {
    /// Published snapshot.
    servers: RwLock<Arc<ServerList>>,

    /// Serializes writers of `servers`.
    list_lock: Mutex<()>,

    /// Set when the last rebalance found no healthy server.
    offline: AtomicBool,

    /// Collapses concurrent failure reports into one rotation.
    notify_failed_barrier: AtomicBool,

    cluster: Arc<dyn ClusterSize>,
    pinger: Arc<dyn Pinger>,

    /// This node's own name. A server with this name is never pinged.
    server_name: String,

    rebalancer: Rebalancer,
    rebalance_config: RebalanceConfig,
    metrics: Arc<RoutingMetrics>,

    shutdown: CancellationToken,
    rebalance_reset: Notify,
}

impl Manager {
    /// Create an empty manager. Start the rebalance loop with [`Manager::run`].
    pub fn new(
        shutdown: CancellationToken,
        cluster: Arc<dyn ClusterSize>,
        pinger: Arc<dyn Pinger>,
        server_name: impl Into<String>,
        rebalancer: Option<Rebalancer>,
    ) -> Self {
        Self {
            servers: RwLock::new(Arc::new(ServerList::default())),
            list_lock: Mutex::new(()),
            offline: AtomicBool::new(false),
            notify_failed_barrier: AtomicBool::new(false),
            cluster,
            pinger,
            server_name: server_name.into(),
            rebalancer: rebalancer.unwrap_or_else(noop_rebalancer),
            rebalance_config: RebalanceConfig::default(),
            metrics: Arc::new(RoutingMetrics::new()),
            shutdown,
            rebalance_reset: Notify::new(),
        }
    }

    /// Set how often the rebalance loop runs.
    pub fn with_rebalance_config(mut self, config: RebalanceConfig) -> Self {
        self.rebalance_config = config;
        self
    }

    /// Record into shared counters instead of private ones.
    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Copy of the current snapshot. Editing the copy does not affect other
    /// readers until it is passed to [`Manager::save_server_list`].
    pub fn get_server_list(&self) -> ServerList {
        self.servers.read().as_ref().clone()
    }

    /// Publish a new snapshot. Callers must hold `list_lock`.
    pub(crate) fn save_server_list(&self, list: ServerList) {
        *self.servers.write() = Arc::new(list);
    }

    fn snapshot(&self) -> Arc<ServerList> {
        self.servers.read().clone()
    }

    /// Add a server, or refresh its record if one with the same key exists.
    pub fn add_server(&self, server: Arc<Server>) {
        let _guard = self.list_lock.lock();
        let mut list = self.get_server_list();
        let name = server.name.clone();
        if list.upsert(server) {
            self.metrics.servers_added.inc();
            debug!(server = %name, "Added server");
        }

        // A newly seen server is assumed healthy until a rebalance says otherwise.
        self.offline.store(false, Ordering::Release);
        self.save_server_list(list);
    }

    /// Remove the server with the same key, if present.
    pub fn remove_server(&self, server: &Server) {
        let _guard = self.list_lock.lock();
        let mut list = self.get_server_list();
        if list.remove_by_key(&server.key()).is_some() {
            self.metrics.servers_removed.inc();
            debug!(server = %server.name, "Removed server");
            self.save_server_list(list);
        }
    }

    /// The preferred server, or `None` if no servers are known.
    pub fn find_server(&self) -> Option<Arc<Server>> {
        self.snapshot().head().cloned()
    }

    /// Report that a request to `server` failed.
    ///
    /// Only a report about the current head moves it to the tail. Reports
    /// about any other server are stale (the list has moved on since the
    /// caller picked it) and are ignored.
    pub fn notify_failed_server(&self, server: &Server) {
        let is_head = |list: &ServerList| {
            list.len() > 1 && list.head().is_some_and(|head| head.same_peer(server))
        };

        if !is_head(self.snapshot().as_ref()) {
            return;
        }

        if self
            .notify_failed_barrier
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        {
            let _guard = self.list_lock.lock();
            let mut list = self.get_server_list();
            if is_head(&list) {
                list.cycle();
                self.save_server_list(list);
                self.metrics.failed_server_rotations.inc();
                debug!(server = %server, "Cycled away from server");
            }
        }

        self.notify_failed_barrier.store(false, Ordering::Release);
    }

    /// Number of known servers.
    pub fn num_servers(&self) -> usize {
        self.snapshot().len()
    }

    /// Number of nodes in the pool backing this manager.
    pub fn num_nodes(&self) -> usize {
        self.cluster.num_nodes()
    }

    /// Copy of the servers in preference order.
    pub fn servers(&self) -> Vec<Arc<Server>> {
        self.get_server_list().into_vec()
    }

    /// Whether this manager has no usable server.
    ///
    /// True when no servers are known or the last rebalance found none
    /// healthy. A manager with servers that has not rebalanced yet is online.
    pub fn is_offline(&self) -> bool {
        self.num_servers() == 0 || self.offline.load(Ordering::Acquire)
    }

    /// Call `f` on each server until it returns false. Returns false if `f`
    /// stopped the walk.
    pub fn check_servers<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&Server) -> bool,
    {
        self.snapshot().servers().iter().all(|s| f(s))
    }

    /// Shuffle the servers and rotate the list to a healthy head.
    ///
    /// The probes run without any lock held. The result is merged with the
    /// list as it stands afterwards, so servers added or removed while
    /// probing are not lost.
    ///
    /// When no server answers, the shuffled order is discarded rather than
    /// published: the list is left as it was and the manager is marked
    /// offline until a server is added or a later rebalance succeeds.
    pub async fn rebalance_servers(&self) {
        let mut list = self.get_server_list();
        list.shuffle();

        let mut found_healthy = false;
        for _ in 0..list.len() {
            let Some(candidate) = list.head().cloned() else {
                break;
            };
            if self.healthy_server(&candidate).await {
                found_healthy = true;
                break;
            }
            list.cycle();
        }

        if !found_healthy {
            self.offline.store(true, Ordering::Release);
            self.metrics.rebalance_failures.inc();
            debug!(servers = list.len(), "No healthy servers during rebalance, aborting");
            return;
        }
        self.offline.store(false, Ordering::Release);

        let selected = list.head().map(|s| s.name.clone()).unwrap_or_default();
        if self.reconcile_server_list(&list) {
            debug!(server = %selected, "Rebalanced servers, new active server");
        } else {
            self.metrics.reconcile_conflicts.inc();
            debug!(server = %selected, "Selected server was removed during rebalance");
        }

        self.metrics.rebalances.inc();
        (self.rebalancer)();
    }

    /// Whether `server` should be used. This node is always considered
    /// healthy since it cannot meaningfully probe itself while starting up.
    async fn healthy_server(&self, server: &Server) -> bool {
        if server.name == self.server_name {
            return true;
        }

        match self
            .pinger
            .ping(&server.datacenter, &server.name, server.addr)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                debug!(server = %server, "Pinging server failed");
                false
            }
            Err(e) => {
                debug!(server = %server, error = %e, "Pinging server failed");
                false
            }
        }
    }

    /// Merge `prior` with the current snapshot and publish the result.
    ///
    /// Servers still present keep their relative order from `prior`; servers
    /// only in the current snapshot are appended in their current order;
    /// servers missing from the current snapshot are dropped. Returns false
    /// when the head of `prior` was dropped, meaning the selection it carried
    /// could not be preserved.
    pub(crate) fn reconcile_server_list(&self, prior: &ServerList) -> bool {
        let _guard = self.list_lock.lock();
        let current = self.get_server_list();

        if prior.is_empty() && current.is_empty() {
            return true;
        }

        let mut authoritative: HashMap<&str, &Arc<Server>> = current
            .servers()
            .iter()
            .map(|s| (s.name.as_str(), s))
            .collect();

        let mut merged = ServerList::default();
        let mut seen = HashSet::new();
        for server in prior.servers() {
            if let Some(fresh) = authoritative.remove(server.name.as_str()) {
                seen.insert(server.name.as_str());
                merged.push(fresh.clone());
            }
        }
        for server in current.servers() {
            if !seen.contains(server.name.as_str()) {
                merged.push(server.clone());
            }
        }

        let kept_head = prior
            .head()
            .is_none_or(|head| merged.contains_key(&head.key()));

        self.save_server_list(merged);
        kept_head
    }

    /// Wake the rebalance loop so it restarts its countdown with a freshly
    /// computed delay.
    pub fn reset_rebalance_timer(&self) {
        self.rebalance_reset.notify_one();
    }

    /// Background rebalance loop. Returns once the shutdown token is cancelled.
    pub async fn run(self: Arc<Self>) {
        loop {
            let delay = self
                .rebalance_config
                .delay(self.num_servers(), self.cluster.num_nodes());

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.rebalance_reset.notified() => continue,
                _ = tokio::time::sleep(delay) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.rebalance_servers() => {}
                    }
                }
            }
        }
        info!("Server manager shutting down");
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("server_name", &self.server_name)
            .field("num_servers", &self.num_servers())
            .field("offline", &self.is_offline())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_server, ErrorPinger, FaultPinger, FixedClusterSize};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_manager(pinger: Arc<dyn Pinger>) -> Manager {
        test_manager_named(pinger, "")
    }

    fn test_manager_named(pinger: Arc<dyn Pinger>, name: &str) -> Manager {
        Manager::new(
            CancellationToken::new(),
            Arc::new(FixedClusterSize(16384)),
            pinger,
            name,
            None,
        )
    }

    fn head_name(m: &Manager) -> Option<String> {
        m.find_server().map(|s| s.name.clone())
    }

    #[test]
    fn test_add_server_is_idempotent() {
        let m = test_manager(FaultPinger::healthy());
        assert_eq!(m.num_servers(), 0);

        let s1 = test_server("s1", "dc1", 1);
        m.add_server(s1.clone());
        assert_eq!(m.num_servers(), 1);
        m.add_server(s1);
        assert_eq!(m.num_servers(), 1);

        m.add_server(test_server("s2", "dc1", 2));
        assert_eq!(m.num_servers(), 2);
    }

    #[test]
    fn test_add_server_refreshes_record() {
        let m = test_manager(FaultPinger::healthy());
        m.add_server(test_server("s1", "dc1", 1));
        m.add_server(test_server("s2", "dc1", 2));
        m.add_server(test_server("s1", "dc1", 9));

        let servers = m.servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].name, "s1");
        assert_eq!(servers[0].addr, test_server("x", "dc1", 9).addr);
    }

    #[test]
    fn test_remove_server_any_position() {
        let m = test_manager(FaultPinger::healthy());
        let servers: Vec<_> = (1..=5)
            .map(|i| test_server(&format!("s{}", i), "dc1", i))
            .collect();
        for s in &servers {
            m.add_server(s.clone());
        }

        // end, front, middle
        m.remove_server(&servers[4]);
        m.remove_server(&servers[0]);
        m.remove_server(&servers[2]);

        let names: Vec<_> = m.servers().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["s2", "s4"]);

        // Absent server is a no-op.
        m.remove_server(&servers[0]);
        assert_eq!(m.num_servers(), 2);
    }

    #[test]
    fn test_find_server() {
        let m = test_manager(FaultPinger::healthy());
        assert!(m.find_server().is_none());

        m.add_server(test_server("s1", "dc1", 1));
        assert_eq!(head_name(&m).as_deref(), Some("s1"));
        m.add_server(test_server("s2", "dc1", 2));
        assert_eq!(head_name(&m).as_deref(), Some("s1"));
    }

    #[test]
    fn test_notify_failed_server_only_moves_head() {
        let m = test_manager(FaultPinger::healthy());
        let s1 = test_server("s1", "dc1", 1);
        let s2 = test_server("s2", "dc1", 2);

        // A single server stays put.
        m.add_server(s1.clone());
        m.notify_failed_server(&s1);
        assert_eq!(head_name(&m).as_deref(), Some("s1"));

        m.add_server(s2.clone());
        m.notify_failed_server(&s2);
        assert_eq!(head_name(&m).as_deref(), Some("s1"));

        m.notify_failed_server(&s1);
        assert_eq!(head_name(&m).as_deref(), Some("s2"));
        assert_eq!(m.metrics.failed_server_rotations.get(), 1);
    }

    #[test]
    fn test_server_list_copy_on_write() {
        let m = test_manager(FaultPinger::healthy());
        for i in 1..=3 {
            m.add_server(test_server(&format!("s{}", i), "dc1", i));
        }

        let before = m.get_server_list();
        let mut copy = m.get_server_list();
        copy.cycle();
        copy.remove_by_key(&before.servers()[1].key());
        assert_eq!(m.get_server_list(), before);

        let _guard = m.list_lock.lock();
        m.save_server_list(copy.clone());
        drop(_guard);
        assert_eq!(m.get_server_list(), copy);
    }

    #[test]
    fn test_offline_before_rebalance() {
        let m = test_manager(FaultPinger::failing());
        assert!(m.is_offline());

        m.add_server(test_server("s1", "dc1", 1));
        assert!(!m.is_offline());

        m.remove_server(&test_server("s1", "dc1", 1));
        assert!(m.is_offline());
    }

    #[tokio::test]
    async fn test_rebalance_all_failing_goes_offline() {
        let m = test_manager(FaultPinger::failing());
        for i in 1..=5 {
            m.add_server(test_server(&format!("s{}", i), "dc1", i));
        }
        let before = m.get_server_list();

        for _ in 0..10 {
            m.rebalance_servers().await;
            assert!(m.is_offline());
        }
        assert_eq!(m.get_server_list(), before);
        assert_eq!(m.metrics.rebalance_failures.get(), 10);

        // Seeing a new server brings it back online optimistically.
        m.add_server(test_server("s6", "dc1", 6));
        assert!(!m.is_offline());
    }

    #[tokio::test]
    async fn test_rebalance_ping_errors_count_as_unhealthy() {
        let m = test_manager(Arc::new(ErrorPinger));
        m.add_server(test_server("s1", "dc1", 1));
        m.add_server(test_server("s2", "dc1", 2));
        m.rebalance_servers().await;
        assert!(m.is_offline());
    }

    #[tokio::test]
    async fn test_rebalance_self_is_always_healthy() {
        let pinger = FaultPinger::failing();
        let m = test_manager_named(pinger.clone(), "s3");
        for i in 1..=5 {
            m.add_server(test_server(&format!("s{}", i), "dc1", i));
        }

        for _ in 0..20 {
            m.rebalance_servers().await;
            assert!(!m.is_offline());
            assert_eq!(head_name(&m).as_deref(), Some("s3"));
        }
    }

    #[tokio::test]
    async fn test_rebalance_avoids_failing_server() {
        let pinger = FaultPinger::healthy();
        let bad = test_server("s1", "dc1", 1);
        pinger.fail_addr(bad.addr);

        let m = test_manager(pinger.clone());
        m.add_server(bad.clone());
        m.add_server(test_server("s2", "dc1", 2));
        m.add_server(test_server("s3", "dc1", 3));

        for _ in 0..100 {
            m.rebalance_servers().await;
            assert_ne!(head_name(&m).as_deref(), Some("s1"));
            assert!(!m.is_offline());
            assert_eq!(m.num_servers(), 3);
        }
        assert!(pinger.pings() >= 100);
    }

    #[tokio::test]
    async fn test_rebalance_invokes_rebalancer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let m = Manager::new(
            CancellationToken::new(),
            Arc::new(FixedClusterSize(3)),
            FaultPinger::healthy(),
            "",
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        );

        m.add_server(test_server("s1", "dc1", 1));
        m.rebalance_servers().await;
        m.rebalance_servers().await;
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        // Empty managers fail to rebalance and do not notify.
        m.remove_server(&test_server("s1", "dc1", 1));
        m.rebalance_servers().await;
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_reconcile_server_list() {
        let pinger = FaultPinger::healthy();
        let m = test_manager(pinger.clone());

        for trial in 0..50 {
            // Rebuild a random mix of healthy and failed servers.
            let total = 2 + (trial % 10) as u8;
            let mut healthy = Vec::new();
            let mut failed = Vec::new();
            for i in 0..total {
                let s = test_server(&format!("s{}-{}", trial, i), "dc1", i + 1);
                if rand::random::<bool>() {
                    pinger.fail_name(&s.name);
                    failed.push(s);
                } else {
                    healthy.push(s);
                }
            }

            let mut original = ServerList::default();
            for s in healthy.iter().chain(failed.iter()) {
                original.push(s.clone());
            }
            original.shuffle();
            {
                let _guard = m.list_lock.lock();
                m.save_server_list(original.clone());
            }

            // Membership drops the failed servers while a rebalance is in flight.
            let prior = m.get_server_list();
            {
                let _guard = m.list_lock.lock();
                m.save_server_list(healthy.iter().cloned().collect());
            }

            let head_failed = prior
                .head()
                .is_some_and(|h| failed.iter().any(|f| f.name == h.name));
            let kept = m.reconcile_server_list(&prior);
            assert_eq!(kept, !head_failed);

            let result = m.get_server_list();
            assert_eq!(result.len(), healthy.len());
            for s in &failed {
                assert!(!result.contains_key(&s.key()));
            }
            for s in &healthy {
                assert!(result.contains_key(&s.key()));
            }

            // Survivors keep the order they had in the prior snapshot.
            let expected: Vec<_> = prior
                .servers()
                .iter()
                .filter(|s| healthy.iter().any(|h| h.name == s.name))
                .map(|s| s.name.clone())
                .collect();
            let actual: Vec<_> = result.servers().iter().map(|s| s.name.clone()).collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_reconcile_appends_new_servers() {
        let m = test_manager(FaultPinger::healthy());
        let a = test_server("a", "dc1", 1);
        let b = test_server("b", "dc1", 2);
        let c = test_server("c", "dc1", 3);
        let d = test_server("d", "dc1", 4);

        let prior: ServerList = vec![b.clone(), a.clone()].into_iter().collect();
        {
            let _guard = m.list_lock.lock();
            m.save_server_list(vec![c.clone(), a.clone(), d.clone(), b.clone()].into_iter().collect());
        }

        assert!(m.reconcile_server_list(&prior));
        let names: Vec<_> = m.servers().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_reconcile_empty_lists() {
        let m = test_manager(FaultPinger::healthy());
        assert!(m.reconcile_server_list(&ServerList::default()));
        assert_eq!(m.num_servers(), 0);

        // Nothing was selected before, so nothing is lost.
        m.add_server(test_server("a", "dc1", 1));
        assert!(m.reconcile_server_list(&ServerList::default()));
        assert_eq!(m.num_servers(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_keeps_concurrent_add() {
        let m = test_manager(FaultPinger::healthy());
        m.add_server(test_server("a", "dc1", 1));
        m.add_server(test_server("b", "dc1", 2));

        let mut prior = m.get_server_list();
        prior.cycle();
        m.add_server(test_server("c", "dc1", 3));

        assert!(m.reconcile_server_list(&prior));
        let names: Vec<_> = m.servers().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_check_servers() {
        let m = test_manager(FaultPinger::healthy());
        for i in 1..=4 {
            m.add_server(test_server(&format!("s{}", i), "dc1", i));
        }

        let mut visited = Vec::new();
        let completed = m.check_servers(|s| {
            visited.push(s.name.clone());
            s.name != "s2"
        });
        assert!(!completed);
        assert_eq!(visited, vec!["s1", "s2"]);

        assert!(m.check_servers(|_| true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rebalances_and_stops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shutdown = CancellationToken::new();
        let m = Arc::new(Manager::new(
            shutdown.clone(),
            Arc::new(FixedClusterSize(1)),
            FaultPinger::healthy(),
            "",
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        ));
        m.add_server(test_server("s1", "dc1", 1));

        let handle = tokio::spawn(m.clone().run());

        // The floor delay is at most three minutes.
        tokio::time::sleep(std::time::Duration::from_secs(181)).await;
        assert!(calls.load(Ordering::Relaxed) >= 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_rebalance_recovers_after_heal() {
        let pinger = FaultPinger::healthy();
        let m = test_manager(pinger.clone());
        for i in 1..=3 {
            let server = test_server(&format!("s{}", i), "dc1", i);
            pinger.fail_name(&server.name);
            m.add_server(server);
        }

        m.rebalance_servers().await;
        assert!(m.is_offline());

        pinger.heal_name("s2");
        m.rebalance_servers().await;
        assert!(!m.is_offline());
        assert_eq!(head_name(&m).as_deref(), Some("s2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_rebalance_timer_uses_new_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let shutdown = CancellationToken::new();
        let config = RebalanceConfig::default()
            .with_min_interval(Duration::from_secs(1))
            .with_jitter_fraction(0)
            .with_conns_per_sec_per_server(1);
        let m = Arc::new(
            Manager::new(
                shutdown.clone(),
                Arc::new(FixedClusterSize(100)),
                FaultPinger::healthy(),
                "",
                Some(Arc::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })),
            )
            .with_rebalance_config(config),
        );
        assert_eq!(m.num_nodes(), 100);
        m.add_server(test_server("s0", "dc1", 100));

        // One server for 100 nodes waits 100s.
        let handle = tokio::spawn(m.clone().run());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        // With 100 servers the delay drops to the 1s floor, but only once
        // the countdown restarts.
        for i in 1..100u8 {
            m.add_server(test_server(&format!("s{}", i), "dc1", i));
        }
        m.reset_rebalance_timer();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(calls.load(Ordering::Relaxed) >= 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_see_whole_snapshots() {
        let m = Arc::new(test_manager(FaultPinger::healthy()));
        let servers: Vec<_> = (1..=8)
            .map(|i| test_server(&format!("s{}", i), "dc1", i))
            .collect();
        for server in &servers {
            m.add_server(server.clone());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let m = m.clone();
                let stop = stop.clone();
                tokio::task::spawn_blocking(move || {
                    let mut reads = 0usize;
                    while !stop.load(Ordering::Relaxed) {
                        let list = m.get_server_list();
                        let names: HashSet<_> = list.servers().iter().map(|s| s.name.clone()).collect();
                        assert_eq!(names.len(), list.len(), "duplicate key in snapshot");
                        assert!(list.len() >= 7);

                        if let Some(head) = m.find_server() {
                            m.notify_failed_server(&head);
                        }
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for round in 0..300 {
            let server = &servers[round % servers.len()];
            m.rebalance_servers().await;
            m.remove_server(server);
            m.add_server(server.clone());
            tokio::task::yield_now().await;
        }

        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
        assert_eq!(m.num_servers(), servers.len());
        assert!(!m.is_offline());
    }
}
