use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

use mavio::dialects::Common;
use mavio::error::FrameError;
use mavio::protocol::{ComponentId, Message as MavlinkMessage, SystemId};

use crate::bus::Hub;
use crate::consts::{GCS_COMPONENT_ID, GCS_SYSTEM_ID};
use crate::mavlink::link::{LinkId, PLANE_LINK};
use crate::mavlink::router::{BroadcastScope, LinkSet};

use crate::prelude::*;

/// Step of the frame pipeline run by a [`ConnectionManager`](super::ConnectionManager).
///
/// Handlers are called synchronously, in pipeline order, for every frame received on any link.
/// A handler must not block: anything slow has to be spawned or queued. Errors are logged and
/// never stop the pipeline.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handler name used in logs.
    fn name(&self) -> &str;

    /// Handles an inbound frame.
    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()>;

    /// Periodic housekeeping called while links are up.
    fn tick(&mut self, _ctx: &HandlerContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called when the current link set is torn down.
    fn reset(&mut self) {}
}

/// Frame received from one of the links together with its decoded message.
pub struct InboundFrame {
    link: LinkId,
    frame: Frame<Versionless>,
    message: Option<Common>,
    malformed: bool,
}

impl InboundFrame {
    /// Wraps a frame received on `link` and decodes its payload.
    ///
    /// Messages that are not part of the `common` dialect are still routed but not decoded.
    pub fn new(link: LinkId, frame: Frame<Versionless>) -> Self {
        let (message, malformed) = match frame.decode::<Common>() {
            Ok(message) => (Some(message), false),
            Err(mavio::error::Error::Frame(FrameError::NotInDialect(_))) => (None, false),
            Err(err) => {
                log::trace!(
                    "[link #{link}] can't decode message #{}: {err:?}",
                    frame.message_id()
                );
                (None, true)
            }
        };

        Self {
            link,
            frame,
            message,
            malformed,
        }
    }

    /// Link this frame was received from.
    #[inline]
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Returns `true` if frame was received from the vehicle link.
    #[inline]
    pub fn is_from_plane(&self) -> bool {
        self.link == PLANE_LINK
    }

    /// Raw frame.
    #[inline]
    pub fn frame(&self) -> &Frame<Versionless> {
        &self.frame
    }

    /// Decoded message, if frame belongs to the `common` dialect.
    #[inline]
    pub fn message(&self) -> Option<&Common> {
        self.message.as_ref()
    }

    /// Returns `true` if frame belongs to the `common` dialect, but its payload or checksum is
    /// broken.
    #[inline]
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

impl Debug for InboundFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundFrame")
            .field("link", &self.link)
            .field("message_id", &self.frame.message_id())
            .field("system_id", &self.frame.system_id())
            .field("component_id", &self.frame.component_id())
            .finish()
    }
}

/// Access to the hub and the links available to a [`FrameHandler`].
pub struct HandlerContext<'a> {
    hub: &'a Hub,
    links: &'a LinkSet,
    factory: &'a FrameFactory,
    vehicle: (SystemId, ComponentId),
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        hub: &'a Hub,
        links: &'a LinkSet,
        factory: &'a FrameFactory,
        vehicle: (SystemId, ComponentId),
    ) -> Self {
        Self {
            hub,
            links,
            factory,
            vehicle,
        }
    }

    /// Message hub.
    #[inline]
    pub fn hub(&self) -> &Hub {
        self.hub
    }

    /// System and component `ID` of the vehicle.
    #[inline]
    pub fn vehicle(&self) -> (SystemId, ComponentId) {
        self.vehicle
    }

    /// Sends a frame verbatim to links within `scope`. Returns the number of links that accepted it.
    pub fn route(&self, frame: &Frame<Versionless>, scope: BroadcastScope) -> usize {
        self.links.send(frame, scope)
    }

    /// Wraps a message into a frame with the hub identity and sends it to the vehicle.
    ///
    /// Returns `false` if the vehicle link dropped the frame.
    pub fn send_to_plane<M: MavlinkMessage>(&self, message: &M) -> Result<bool> {
        let frame = self.factory.build(message)?;
        Ok(self.links.send_to_plane(&frame))
    }
}

/// Builds frames originated by the hub.
///
/// All frames carry the ground station identity and a shared wrapping sequence counter.
#[derive(Debug)]
pub(crate) struct FrameFactory {
    system_id: SystemId,
    component_id: ComponentId,
    sequence: AtomicU8,
}

impl Default for FrameFactory {
    fn default() -> Self {
        Self {
            system_id: GCS_SYSTEM_ID,
            component_id: GCS_COMPONENT_ID,
            sequence: AtomicU8::new(0),
        }
    }
}

impl FrameFactory {
    pub(crate) fn build<M: MavlinkMessage>(&self, message: &M) -> Result<Frame<Versionless>> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::builder()
            .sequence(sequence)
            .system_id(self.system_id)
            .component_id(self.component_id)
            .version(V2)
            .message(message)?
            .build();
        Ok(frame.into_versionless())
    }
}
