use crate::mavlink::{BroadcastScope, FrameHandler, HandlerContext, InboundFrame};

use crate::prelude::*;

/// Forwards every frame verbatim to all links except the one it came from.
#[derive(Debug, Default)]
pub struct ForwardHandler;

impl FrameHandler for ForwardHandler {
    fn name(&self) -> &str {
        "forward"
    }

    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()> {
        let delivered = ctx.route(frame.frame(), BroadcastScope::Except(frame.link()));
        log::trace!("[forward] frame from link #{} sent to {delivered} links", frame.link());
        Ok(())
    }
}

#[cfg(test)]
mod forward_tests {
    use mavio::dialects::common::messages::Heartbeat;

    use super::*;
    use crate::bus::Hub;
    use crate::test_utils::{vehicle_frame, FakeLinks};

    #[tokio::test]
    async fn frames_are_never_echoed() {
        let hub = Hub::with_default_topics();
        let mut links = FakeLinks::new(3);
        let mut handler = ForwardHandler;

        let frame = InboundFrame::new(1, vehicle_frame(&Heartbeat::default()));
        handler.handle(&frame, &links.ctx(&hub)).unwrap();

        assert_eq!(links.drain(0).len(), 1);
        assert!(links.drain(1).is_empty());
        assert_eq!(links.drain(2).len(), 1);
    }
}
