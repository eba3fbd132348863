use std::fmt::Debug;
use std::sync::Arc;

use mavio::dialects::Common;

use crate::bus::topics::{PLANE_LOC, TELEMETRY};
use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame};
use crate::telemetry::{PlaneLocation, Telemetry};

use crate::prelude::*;

/// Sink for telemetry time series.
///
/// Implementations must not block: writes are issued from the frame pipeline.
pub trait TimeSeriesWriter: Debug + Send + Sync + 'static {
    /// Records a telemetry sample.
    fn write(&self, telemetry: &Telemetry) -> Result<()>;
}

/// Converts `GLOBAL_POSITION_INT` into [`Telemetry`].
///
/// Publishes telemetry on `telemetry`, a [`PlaneLocation`] on `plane_loc`, and records the sample
/// to a [`TimeSeriesWriter`] if one is configured.
#[derive(Debug, Default)]
pub struct TelemetryHandler {
    writer: Option<Arc<dyn TimeSeriesWriter>>,
}

impl TelemetryHandler {
    /// Creates a handler without time-series recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every sample to `writer`.
    pub fn with_writer(mut self, writer: Arc<dyn TimeSeriesWriter>) -> Self {
        self.writer = Some(writer);
        self
    }
}

impl FrameHandler for TelemetryHandler {
    fn name(&self) -> &str {
        "telemetry"
    }

    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()> {
        let msg = match frame.message() {
            Some(Common::GlobalPositionInt(msg)) if frame.is_from_plane() => msg,
            _ => return Ok(()),
        };

        let telemetry = Telemetry::from(msg);
        if !ctx.hub().publish_json(TELEMETRY, &telemetry)? {
            log::trace!("[telemetry] telemetry sample dropped");
        }
        ctx.hub()
            .publish_json(PLANE_LOC, &PlaneLocation::from(msg))?;

        if let Some(writer) = &self.writer {
            writer.write(&telemetry)?;
        }
        Ok(())
    }
}
