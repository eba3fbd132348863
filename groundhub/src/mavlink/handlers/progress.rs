use mavio::dialects::Common;
use serde_json::json;

use crate::bus::topics::PLANE_STATUS;
use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame};

use crate::prelude::*;

/// Reports mission progress on `plane_status`.
///
/// Publishes `{"mission_current": seq}` whenever the active waypoint changes and
/// `{"mission_item_reached": seq}` whenever the vehicle reaches a waypoint.
#[derive(Debug, Default)]
pub struct MissionProgressHandler {
    current: Option<u16>,
}

impl FrameHandler for MissionProgressHandler {
    fn name(&self) -> &str {
        "mission_progress"
    }

    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()> {
        if !frame.is_from_plane() {
            return Ok(());
        }

        match frame.message() {
            Some(Common::MissionCurrent(msg)) if self.current != Some(msg.seq) => {
                log::info!("[mission_progress] current waypoint is {}", msg.seq);
                self.current = Some(msg.seq);
                ctx.hub()
                    .publish_json(PLANE_STATUS, &json!({ "mission_current": msg.seq }))?;
            }
            Some(Common::MissionItemReached(msg)) => {
                log::info!("[mission_progress] waypoint {} reached", msg.seq);
                ctx.hub()
                    .publish_json(PLANE_STATUS, &json!({ "mission_item_reached": msg.seq }))?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.current = None;
    }
}
