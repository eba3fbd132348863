use crate::mavlink::link::{Link, LinkId, PLANE_LINK};

use crate::prelude::*;

/// Defines which links should receive a frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Send to all links (default value).
    #[default]
    All,
    /// Send only to this link.
    Exact(LinkId),
    /// Send to all links except this one.
    Except(LinkId),
}

impl BroadcastScope {
    pub(crate) fn should_send_to(&self, recipient: LinkId) -> bool {
        match *self {
            BroadcastScope::All => true,
            BroadcastScope::Exact(id) => id == recipient,
            BroadcastScope::Except(id) => id != recipient,
        }
    }
}

/// Set of links established within one connection generation.
///
/// Link `0` is the vehicle, the rest are router targets in the order they were configured.
#[derive(Debug, Default)]
pub(crate) struct LinkSet {
    links: Vec<Link>,
}

impl LinkSet {
    pub(crate) fn new(links: Vec<Link>) -> Self {
        Self { links }
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }

    /// Sends a frame to every link within `scope`. Returns the number of links that accepted it.
    pub(crate) fn send(&self, frame: &Frame<Versionless>, scope: BroadcastScope) -> usize {
        self.links
            .iter()
            .filter(|link| scope.should_send_to(link.id()))
            .filter(|link| link.send(frame.clone()))
            .count()
    }

    /// Sends a frame to the vehicle.
    pub(crate) fn send_to_plane(&self, frame: &Frame<Versionless>) -> bool {
        self.send(frame, BroadcastScope::Exact(PLANE_LINK)) > 0
    }

    pub(crate) fn descriptors(&self) -> impl Iterator<Item = String> + '_ {
        self.links.iter().map(|link| link.descriptor().to_string())
    }
}
