//! Ordered server snapshots.

use crate::metadata::{Server, ServerKey};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// An ordered list of candidate servers.
///
/// Index 0 is the current preference. A manager publishes one list at a time
/// and hands out copies; editing a copy never changes what other readers see
/// until it is saved back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerList {
    servers: Vec<Arc<Server>>,
}

impl ServerList {
    /// Wrap servers in preference order.
    pub fn new(servers: Vec<Arc<Server>>) -> Self {
        Self { servers }
    }

    /// Servers in preference order.
    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }

    /// Number of servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// The preferred server.
    pub fn head(&self) -> Option<&Arc<Server>> {
        self.servers.first()
    }

    pub fn contains_key(&self, key: &ServerKey) -> bool {
        self.position(key).is_some()
    }

    pub fn position(&self, key: &ServerKey) -> Option<usize> {
        self.servers.iter().position(|s| s.name == key.name)
    }

    /// Move the head to the tail.
    pub fn cycle(&mut self) {
        if self.servers.len() > 1 {
            self.servers.rotate_left(1);
        }
    }

    /// Put the servers in a uniformly random order.
    pub fn shuffle(&mut self) {
        self.servers.shuffle(&mut rand::rng());
    }

    /// Append a server, or replace the record with the same key in place.
    ///
    /// Returns true if the server was not known before.
    pub fn upsert(&mut self, server: Arc<Server>) -> bool {
        match self.position(&server.key()) {
            Some(idx) => {
                self.servers[idx] = server;
                false
            }
            None => {
                self.servers.push(server);
                true
            }
        }
    }

    /// Remove the first server with the given key.
    pub fn remove_by_key(&mut self, key: &ServerKey) -> Option<Arc<Server>> {
        let idx = self.position(key)?;
        Some(self.servers.remove(idx))
    }

    pub(crate) fn push(&mut self, server: Arc<Server>) {
        self.servers.push(server);
    }

    pub fn into_vec(self) -> Vec<Arc<Server>> {
        self.servers
    }
}

impl FromIterator<Arc<Server>> for ServerList {
    fn from_iter<I: IntoIterator<Item = Arc<Server>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
