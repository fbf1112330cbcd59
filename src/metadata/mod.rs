//! Parsing of member tags into server records.
//!
//! Servers advertise their role, datacenter and RPC endpoint through gossip
//! tags. Recognized tags:
//!
//! | tag | meaning |
//! |---|---|
//! | `role` | must be `server` |
//! | `dc` | datacenter (required) |
//! | `port` | RPC port (required) |
//! | `id` | node ID |
//! | `segment` | network segment |
//! | `vsn` | RPC protocol version (required) |
//! | `raft_vsn` | Raft protocol version |
//! | `build` | build version, optionally suffixed with `:<revision>` |
//! | `expect` | bootstrap-expect count |
//! | `bootstrap`, `use_tls`, `nonvoter`, `read_replica` | flags, present means set |
//! | `sl_<segment>` | `host:port` for a segment listener |

mod server;

pub use server::{Server, ServerKey};

use crate::cluster::Member;
use crate::error::MetadataError;
use semver::Version;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

/// Role tag value that marks a member as a server.
pub const SERVER_ROLE: &str = "server";

const SEGMENT_LISTENER_PREFIX: &str = "sl_";

/// Parse `member` into a server record, or `None` if it is not a valid server.
pub fn is_server(member: &Member) -> Option<Server> {
    Server::from_member(member).ok()
}

impl Server {
    /// Parse a member's tags into a server record.
    pub fn from_member(m: &Member) -> Result<Self, MetadataError> {
        if m.tags.get("role").map(String::as_str) != Some(SERVER_ROLE) {
            return Err(MetadataError::NotAServer(m.name.clone()));
        }

        let datacenter = required(m, "dc")?.to_string();
        let port: u16 = parse_tag(m, "port", required(m, "port")?)?;
        let version: u32 = parse_tag(m, "vsn", required(m, "vsn")?)?;

        let raft_version = match m.tags.get("raft_vsn") {
            Some(v) => parse_tag(m, "raft_vsn", v)?,
            None => 0,
        };
        let expect = match m.tags.get("expect") {
            Some(v) => parse_tag(m, "expect", v)?,
            None => 0,
        };
        let build = match m.tags.get("build") {
            Some(v) => parse_build(m, v)?,
            None => Version::new(0, 0, 0),
        };

        let mut segment_addrs = HashMap::new();
        let mut segment_ports = HashMap::new();
        for (tag, value) in &m.tags {
            let Some(segment) = tag.strip_prefix(SEGMENT_LISTENER_PREFIX) else {
                continue;
            };
            let (host, port) = value
                .rsplit_once(':')
                .ok_or_else(|| MetadataError::invalid(&m.name, tag.as_str(), value))?;
            let port: u16 = parse_tag(m, tag, port)?;
            segment_addrs.insert(segment.to_string(), host.to_string());
            segment_ports.insert(segment.to_string(), port);
        }

        Ok(Server {
            name: m.name.clone(),
            id: m.tags.get("id").cloned().unwrap_or_default(),
            datacenter,
            segment: m.tags.get("segment").cloned().unwrap_or_default(),
            addr: SocketAddr::new(m.addr, port),
            port,
            segment_addrs,
            segment_ports,
            use_tls: m.tags.contains_key("use_tls"),
            version,
            raft_version,
            build,
            non_voter: m.tags.contains_key("nonvoter") || m.tags.contains_key("read_replica"),
            bootstrap: m.tags.contains_key("bootstrap"),
            expect,
            status: m.status,
        })
    }
}

fn required<'a>(m: &'a Member, tag: &'static str) -> Result<&'a str, MetadataError> {
    m.tags
        .get(tag)
        .map(String::as_str)
        .ok_or_else(|| MetadataError::MissingTag {
            member: m.name.clone(),
            tag,
        })
}

fn parse_tag<T: FromStr>(m: &Member, tag: &str, value: &str) -> Result<T, MetadataError> {
    value
        .parse()
        .map_err(|_| MetadataError::invalid(&m.name, tag, value))
}

fn parse_build(m: &Member, value: &str) -> Result<Version, MetadataError> {
    // Builds may carry a revision after a colon, e.g. "1.4.2:4a1b6c3".
    let version = value.split(':').next().unwrap_or(value);
    Version::parse(version).map_err(|_| MetadataError::invalid(&m.name, "build", value))
}
