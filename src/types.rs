//! Core types used throughout the routing layer.

use crate::cluster::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a network area.
///
/// An area is one gossip pool tracked independently by the router. The
/// local pool is always [`AreaId::lan`]; the pool joining all datacenters'
/// servers is [`AreaId::wan`]. Any other value names a user-defined area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AreaId(String);

impl AreaId {
    const LAN: &'static str = "lan";
    const WAN: &'static str = "wan";

    /// Create an area ID from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The local (LAN) area.
    pub fn lan() -> Self {
        Self(Self::LAN.to_string())
    }

    /// The cross-datacenter (WAN) area.
    pub fn wan() -> Self {
        Self(Self::WAN.to_string())
    }

    /// Whether this is the LAN area.
    pub fn is_lan(&self) -> bool {
        self.0 == Self::LAN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AreaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AreaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Network coordinate of one server, as reported by its area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCoordinate {
    /// Server name.
    pub node: String,
    /// Last cached coordinate for the server.
    pub coord: Coordinate,
}

/// Raw coordinates of the servers of one datacenter within one area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatacenterMap {
    pub datacenter: String,
    pub area_id: AreaId,
    pub coordinates: Vec<NodeCoordinate>,
}
