//! Server records produced from member tags.

use crate::cluster::MemberStatus;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Identity of a server within a datacenter.
///
/// Two [`Server`] values describe the same peer iff their keys are equal,
/// regardless of drift in any other field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerKey {
    pub name: String,
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A routable server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Node name, unique within the datacenter.
    pub name: String,
    /// Node ID.
    pub id: String,
    pub datacenter: String,
    /// Network segment the server serves. Empty for the default segment.
    pub segment: String,
    /// Resolved RPC address.
    pub addr: SocketAddr,
    /// RPC port.
    pub port: u16,
    /// Per-segment advertised hosts.
    pub segment_addrs: HashMap<String, String>,
    /// Per-segment advertised ports.
    pub segment_ports: HashMap<String, u16>,
    /// Dial this server over TLS.
    pub use_tls: bool,
    /// RPC protocol version.
    pub version: u32,
    pub raft_version: u32,
    /// Build version of the server binary.
    pub build: Version,
    /// Read replica that never votes.
    pub non_voter: bool,
    pub bootstrap: bool,
    /// Expected number of servers when bootstrapping.
    pub expect: u32,
    /// Last known membership status.
    pub status: MemberStatus,
}

impl Server {
    /// Minimal alive server record, mostly useful for tests and static setups.
    pub fn new(name: impl Into<String>, datacenter: impl Into<String>, addr: SocketAddr) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            datacenter: datacenter.into(),
            segment: String::new(),
            addr,
            port: addr.port(),
            segment_addrs: HashMap::new(),
            segment_ports: HashMap::new(),
            use_tls: false,
            version: 0,
            raft_version: 0,
            build: Version::new(0, 0, 0),
            non_voter: false,
            bootstrap: false,
            expect: 0,
            status: MemberStatus::Alive,
        }
    }

    /// The identity projection of this server.
    pub fn key(&self) -> ServerKey {
        ServerKey {
            name: self.name.clone(),
        }
    }

    /// Whether `other` describes the same peer.
    pub fn same_peer(&self, other: &Server) -> bool {
        self.name == other.name
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Addr: {}) (DC: {})", self.name, self.addr, self.datacenter)
    }
}
