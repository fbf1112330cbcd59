//! Error types for the routing layer.

use crate::types::AreaId;
use thiserror::Error;

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the routing layer.
///
/// Only configuration problems surface as errors. Unhealthy servers and
/// empty datacenters are reported through return values instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The area is already registered with the router.
    #[error("area ID {0:?} already exists")]
    AreaExists(AreaId),

    /// The area is not registered with the router.
    #[error("area ID {0:?} does not exist")]
    AreaNotFound(AreaId),

    /// The router was shut down and no longer accepts areas.
    #[error("cannot add area, router is shut down")]
    RouterShutdown,

    /// The local network coordinate is unavailable.
    #[error("coordinate error: {0}")]
    Coordinate(String),

    /// Member tags could not be parsed into a server record.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// A health probe could not be performed.
    #[error("ping to {server} failed: {reason}")]
    Ping { server: String, reason: String },
}

/// Errors produced while parsing member tags into a [`Server`](crate::metadata::Server).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The member does not advertise the server role.
    #[error("member {0:?} is not a server")]
    NotAServer(String),

    /// A required tag is absent.
    #[error("member {member:?} is missing tag {tag:?}")]
    MissingTag { member: String, tag: &'static str },

    /// A tag is present but could not be parsed.
    #[error("member {member:?} has invalid tag {tag:?}: {value:?}")]
    InvalidTag {
        member: String,
        tag: String,
        value: String,
    },
}

impl MetadataError {
    pub(crate) fn invalid(member: &str, tag: impl Into<String>, value: &str) -> Self {
        MetadataError::InvalidTag {
            member: member.to_string(),
            tag: tag.into(),
            value: value.to_string(),
        }
    }
}
