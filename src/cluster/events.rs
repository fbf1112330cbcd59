//! Cluster membership events and their translation into router calls.

use super::Member;
use crate::error::MetadataError;
use crate::metadata::Server;
use crate::router::Router;
use crate::types::AreaId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events delivered by a gossip pool.
#[derive(Debug, Clone)]
pub enum MemberEvent {
    /// Members joined the pool.
    Join(Vec<Member>),

    /// Members changed their tags.
    Update(Vec<Member>),

    /// Members left gracefully.
    Leave(Vec<Member>),

    /// Failed or departed members were reaped from the pool.
    Reap(Vec<Member>),

    /// Members stopped responding to probes.
    Failed(Vec<Member>),

    /// A user event with the given name. Carries no membership change.
    User(String),
}

impl MemberEvent {
    /// Members affected by this event.
    pub fn members(&self) -> &[Member] {
        match self {
            MemberEvent::Join(members)
            | MemberEvent::Update(members)
            | MemberEvent::Leave(members)
            | MemberEvent::Reap(members)
            | MemberEvent::Failed(members) => members,
            MemberEvent::User(_) => &[],
        }
    }

    /// Short name of the event kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MemberEvent::Join(_) => "member-join",
            MemberEvent::Update(_) => "member-update",
            MemberEvent::Leave(_) => "member-leave",
            MemberEvent::Reap(_) => "member-reap",
            MemberEvent::Failed(_) => "member-failed",
            MemberEvent::User(_) => "user",
        }
    }

    /// Check if this is a join-type event.
    pub fn is_join(&self) -> bool {
        matches!(self, MemberEvent::Join(_) | MemberEvent::Update(_))
    }

    /// Check if this is a leave-type event.
    pub fn is_leave(&self) -> bool {
        matches!(self, MemberEvent::Leave(_) | MemberEvent::Reap(_))
    }
}

/// Listener for membership events.
pub trait MemberEventListener: Send + Sync + 'static {
    /// Called when a membership event occurs.
    fn on_event(&self, event: MemberEvent);
}

/// Feeds server membership changes of one area into a [`Router`].
///
/// Joins and updates add servers, leaves and reaps remove them, and failures
/// shift traffic away from them. Members that are not servers are skipped.
/// Router errors are logged and never returned.
pub struct ServerEventHandler {
    router: Arc<Router>,
    area_id: AreaId,
}

impl ServerEventHandler {
    pub fn new(router: Arc<Router>, area_id: AreaId) -> Self {
        Self { router, area_id }
    }

    pub fn area_id(&self) -> &AreaId {
        &self.area_id
    }

    fn parse(&self, kind: &'static str, member: &Member) -> Option<Server> {
        match Server::from_member(member) {
            Ok(server) => Some(server),
            Err(MetadataError::NotAServer(name)) => {
                debug!(member = %name, area = %self.area_id, event = kind, "Ignoring non-server member");
                None
            }
            Err(e) => {
                warn!(member = %member.name, area = %self.area_id, event = kind, error = %e, "Skipping member with bad server tags");
                None
            }
        }
    }
}

impl MemberEventListener for ServerEventHandler {
    fn on_event(&self, event: MemberEvent) {
        let kind = event.kind();
        if let MemberEvent::User(name) = &event {
            debug!(name = %name, area = %self.area_id, "Ignoring user event");
            return;
        }

        for member in event.members() {
            let Some(server) = self.parse(kind, member) else {
                continue;
            };

            let result = match &event {
                MemberEvent::Join(_) | MemberEvent::Update(_) => {
                    info!(server = %server, area = %self.area_id, event = kind, "Adding server");
                    self.router.add_server(&self.area_id, server)
                }
                MemberEvent::Leave(_) | MemberEvent::Reap(_) => {
                    info!(server = %server, area = %self.area_id, event = kind, "Removing server");
                    self.router.remove_server(&self.area_id, &server)
                }
                MemberEvent::Failed(_) => {
                    info!(server = %server, area = %self.area_id, "Failing server");
                    self.router.fail_server(&self.area_id, &server)
                }
                MemberEvent::User(_) => Ok(()),
            };

            if let Err(e) = result {
                warn!(member = %member.name, area = %self.area_id, event = kind, error = %e, "Failed to apply membership event");
            }
        }
    }
}

/// Apply membership events for `area_id` to `router` until `shutdown` is
/// cancelled or the sender side of `events` is dropped.
pub async fn handle_member_events(
    router: Arc<Router>,
    area_id: AreaId,
    shutdown: CancellationToken,
    mut events: mpsc::Receiver<MemberEvent>,
) {
    let handler = ServerEventHandler::new(router, area_id);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(area = %handler.area_id, "Membership event handler shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!(area = %handler.area_id, "Membership event channel closed");
                    break;
                };
                handler.on_event(event);
            }
        }
    }
}
