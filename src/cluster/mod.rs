//! Membership cluster interface and event handling.
//!
//! The router never talks to the gossip layer directly. Each area is backed
//! by a [`RouterCluster`] handle that reports the current members and their
//! network coordinates, and membership changes arrive as [`MemberEvent`]s
//! that [`handle_member_events`] turns into router calls.

pub mod coordinate;
pub mod events;

pub use coordinate::{compute_distance, Coordinate};
pub use events::{handle_member_events, MemberEvent, MemberEventListener, ServerEventHandler};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Last known membership status of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Reachable and participating in gossip.
    Alive,
    /// Announced its intent to leave.
    Leaving,
    /// Left gracefully.
    Left,
    /// Stopped responding to probes.
    Failed,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Alive => "alive",
            MemberStatus::Leaving => "leaving",
            MemberStatus::Left => "left",
            MemberStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A member of a gossip pool, as reported by the membership layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Member name, unique within the pool.
    pub name: String,
    /// Gossip address.
    pub addr: IpAddr,
    /// Gossip port.
    pub port: u16,
    /// Metadata tags advertised by the member.
    pub tags: HashMap<String, String>,
    /// Membership status.
    pub status: MemberStatus,
}

impl Member {
    /// Create an alive member without tags.
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr: addr.ip(),
            port: addr.port(),
            tags: HashMap::new(),
            status: MemberStatus::Alive,
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_status(mut self, status: MemberStatus) -> Self {
        self.status = status;
        self
    }
}

/// Size of the local membership pool, used to scale rebalance intervals.
pub trait ClusterSize: Send + Sync + 'static {
    /// Number of nodes currently known to the pool.
    fn num_nodes(&self) -> usize;
}

/// Handle to the gossip pool backing one network area.
pub trait RouterCluster: ClusterSize {
    /// Current members of the pool.
    fn members(&self) -> Vec<Member>;

    /// Network coordinate of the local node.
    fn get_coordinate(&self) -> Result<Coordinate>;

    /// Last coordinate cached for the named member, if any.
    fn get_cached_coordinate(&self, name: &str) -> Option<Coordinate>;
}
