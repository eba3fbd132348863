//! Mission upload (hub → vehicle).
//!
//! ```text
//! hub:     MISSION_COUNT ─────────────► ITEM_INT(0) ──────────► … ITEM_INT(n-1)
//! vehicle:               REQUEST_INT(0) ─────────► REQUEST_INT(1) …               MISSION_ACK
//! ```
//!
//! Every message sent by the hub is retransmitted when the vehicle doesn't answer within the
//! protocol timeout. The transfer is abandoned after the retry budget is exhausted.

use std::time::Duration;

use mavio::dialects::common::enums::MavMissionType;
use mavio::dialects::common::messages::MissionCount;
use mavio::dialects::Common;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bus::topics::PLANE_STATUS;
use crate::consts::{MISSION_PROTOCOL_RETRIES, MISSION_PROTOCOL_TIMEOUT};
use crate::mavlink::handlers::mission_item::{is_accepted, MissionItem, TransferOutcome};
use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame};

use crate::prelude::*;

/// Uploads waypoint lists received from the `mission_upload` endpoint to the vehicle.
///
/// Requests are JSON arrays of [`MissionItem`]s. Only one transfer runs at a time, further
/// requests wait in the endpoint queue. Outcomes are published on `plane_status` as
/// `{"mission_upload": <outcome>}`.
#[derive(Debug)]
pub struct MissionUploadHandler {
    requests: mpsc::Receiver<Vec<u8>>,
    timeout: Duration,
    retries: usize,
    state: UploadState,
}

#[derive(Debug)]
enum UploadState {
    Idle,
    InProgress {
        items: Vec<MissionItem>,
        last_sent: Sent,
        deadline: Instant,
        retries_left: usize,
    },
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Sent {
    Count,
    Item(u16),
}

impl MissionUploadHandler {
    /// Creates a handler consuming requests from the receiving side of the `mission_upload`
    /// endpoint queue.
    pub fn new(requests: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            requests,
            timeout: MISSION_PROTOCOL_TIMEOUT,
            retries: MISSION_PROTOCOL_RETRIES,
            state: UploadState::Idle,
        }
    }

    /// Overrides protocol timeout and retransmission budget.
    pub fn with_protocol(mut self, timeout: Duration, retries: usize) -> Self {
        self.timeout = timeout;
        self.retries = retries;
        self
    }

    /// Returns `true` if a transfer is running.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, UploadState::InProgress { .. })
    }

    fn start_next(&mut self, ctx: &HandlerContext<'_>) -> Result<()> {
        let payload = match self.requests.try_recv() {
            Ok(payload) => payload,
            Err(_) => return Ok(()),
        };

        let items: Vec<MissionItem> = serde_json::from_slice(&payload)?;
        if items.len() > u16::MAX as usize {
            log::warn!("[mission_upload] too many items: {}", items.len());
            return Ok(());
        }
        log::info!("[mission_upload] uploading {} items", items.len());

        self.state = UploadState::InProgress {
            items,
            last_sent: Sent::Count,
            deadline: Instant::now() + self.timeout,
            retries_left: self.retries,
        };
        self.transmit(ctx)
    }

    fn transmit(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let UploadState::InProgress {
            items, last_sent, ..
        } = &self.state
        else {
            return Ok(());
        };
        let (target_system, target_component) = ctx.vehicle();

        match *last_sent {
            Sent::Count => {
                ctx.send_to_plane(&MissionCount {
                    target_system,
                    target_component,
                    count: items.len() as u16,
                    mission_type: MavMissionType::Mission,
                    ..Default::default()
                })?;
            }
            Sent::Item(seq) => {
                if let Some(item) = items.get(seq as usize) {
                    ctx.send_to_plane(&item.to_message(seq, ctx.vehicle()))?;
                }
            }
        }
        Ok(())
    }

    fn on_request(&mut self, seq: u16, ctx: &HandlerContext<'_>) -> Result<()> {
        let timeout = self.timeout;
        let retries = self.retries;
        let UploadState::InProgress {
            items,
            last_sent,
            deadline,
            retries_left,
        } = &mut self.state
        else {
            return Ok(());
        };

        if seq as usize >= items.len() {
            log::warn!("[mission_upload] vehicle requested item {seq} out of {}", items.len());
            return Ok(());
        }

        log::debug!("[mission_upload] sending item {seq}");
        *last_sent = Sent::Item(seq);
        *deadline = Instant::now() + timeout;
        *retries_left = retries;
        self.transmit(ctx)
    }

    fn finish(&mut self, outcome: TransferOutcome, ctx: &HandlerContext<'_>) -> Result<()> {
        self.state = UploadState::Idle;
        match &outcome {
            TransferOutcome::Accepted { count } => {
                log::info!("[mission_upload] vehicle accepted {count} items")
            }
            other => log::warn!("[mission_upload] transfer failed: {other:?}"),
        }
        ctx.hub()
            .publish_json(PLANE_STATUS, &json!({ "mission_upload": outcome }))?;
        Ok(())
    }
}

impl FrameHandler for MissionUploadHandler {
    fn name(&self) -> &str {
        "mission_upload"
    }

    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()> {
        if !frame.is_from_plane() || !self.is_busy() {
            return Ok(());
        }

        match frame.message() {
            Some(Common::MissionRequestInt(msg)) => self.on_request(msg.seq, ctx),
            Some(Common::MissionRequest(msg)) => self.on_request(msg.seq, ctx),
            Some(Common::MissionAck(msg)) => {
                let count = match &self.state {
                    UploadState::InProgress { items, .. } => items.len(),
                    UploadState::Idle => 0,
                };
                let outcome = if is_accepted(msg.type_) {
                    TransferOutcome::Accepted { count }
                } else {
                    TransferOutcome::Rejected {
                        reason: format!("{:?}", msg.type_),
                    }
                };
                self.finish(outcome, ctx)
            }
            _ => Ok(()),
        }
    }

    fn tick(&mut self, ctx: &HandlerContext<'_>) -> Result<()> {
        if !self.is_busy() {
            return self.start_next(ctx);
        }
        let UploadState::InProgress {
            last_sent,
            deadline,
            retries_left,
            ..
        } = &mut self.state
        else {
            return Ok(());
        };

        if Instant::now() < *deadline {
            return Ok(());
        }
        if *retries_left == 0 {
            return self.finish(TransferOutcome::Timeout, ctx);
        }

        log::debug!("[mission_upload] retransmitting {last_sent:?}");
        *retries_left -= 1;
        *deadline = Instant::now() + self.timeout;
        self.transmit(ctx)
    }

    fn reset(&mut self) {
        if self.is_busy() {
            log::warn!("[mission_upload] link lost, transfer abandoned");
        }
        self.state = UploadState::Idle;
    }
}
