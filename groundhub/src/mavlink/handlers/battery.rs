use mavio::dialects::common::messages::BatteryStatus;
use mavio::dialects::Common;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::bus::topics::PLANE_STATUS;
use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame};

use crate::prelude::*;

/// Last known battery state of the vehicle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Battery `ID`.
    pub id: u8,
    /// Total voltage in volts, `None` if unknown.
    pub voltage: Option<f32>,
    /// Current in amperes, `None` if unknown.
    pub current: Option<f32>,
    /// Remaining capacity in percent, `None` if unknown.
    pub remaining: Option<i8>,
}

const CELL_VOLTAGE_UNKNOWN: u16 = u16::MAX;

impl From<&BatteryStatus> for BatteryState {
    fn from(msg: &BatteryStatus) -> Self {
        let cells: Vec<u16> = msg
            .voltages
            .iter()
            .copied()
            .filter(|&mv| mv != CELL_VOLTAGE_UNKNOWN)
            .collect();
        let voltage = if cells.is_empty() {
            None
        } else {
            Some(cells.iter().map(|&mv| mv as f32).sum::<f32>() / 1000.0)
        };

        Self {
            id: msg.id,
            voltage,
            current: (msg.current_battery >= 0).then(|| msg.current_battery as f32 / 100.0),
            remaining: (msg.battery_remaining >= 0).then_some(msg.battery_remaining),
        }
    }
}

/// Caches `BATTERY_STATUS` and republishes it on `plane_status` as `{"battery": <state>}`.
#[derive(Debug)]
pub struct BatteryHandler {
    cache: watch::Sender<Option<BatteryState>>,
}

impl BatteryHandler {
    /// Creates a handler and a receiver of the cached battery state.
    pub fn new() -> (Self, watch::Receiver<Option<BatteryState>>) {
        let (cache, receiver) = watch::channel(None);
        (Self { cache }, receiver)
    }
}

impl FrameHandler for BatteryHandler {
    fn name(&self) -> &str {
        "battery"
    }

    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()> {
        let msg = match frame.message() {
            Some(Common::BatteryStatus(msg)) if frame.is_from_plane() => msg,
            _ => return Ok(()),
        };

        let state = BatteryState::from(msg);
        self.cache.send_replace(Some(state));
        ctx.hub()
            .publish_json(PLANE_STATUS, &json!({ "battery": state }))?;
        Ok(())
    }
}
