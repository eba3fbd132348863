//! Mission download (vehicle → hub).
//!
//! ```text
//! hub:     REQUEST_LIST ──────────► REQUEST_INT(0) ─────────► … REQUEST_INT(n-1) ──────────► MISSION_ACK
//! vehicle:              MISSION_COUNT ──────────► ITEM_INT(0) …                  ITEM_INT(n-1)
//! ```

use std::time::Duration;

use mavio::dialects::common::enums::{MavMissionResult, MavMissionType};
use mavio::dialects::common::messages::{MissionAck, MissionRequestInt, MissionRequestList};
use mavio::dialects::Common;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bus::topics::{PLANE_MISSION, PLANE_STATUS};
use crate::consts::{MISSION_PROTOCOL_RETRIES, MISSION_PROTOCOL_TIMEOUT};
use crate::mavlink::handlers::mission_item::{MissionItem, TransferOutcome};
use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame};

use crate::prelude::*;

/// Downloads the mission stored on the vehicle when anything is sent to the `mission_download`
/// endpoint.
///
/// The downloaded mission is published on `plane_mission` as `{"items": [...]}`. Failures are
/// published on `plane_status` as `{"mission_download": <outcome>}`.
#[derive(Debug)]
pub struct MissionDownloadHandler {
    requests: mpsc::Receiver<Vec<u8>>,
    timeout: Duration,
    retries: usize,
    state: DownloadState,
}

#[derive(Debug)]
enum DownloadState {
    Idle,
    AwaitingCount {
        deadline: Instant,
        retries_left: usize,
    },
    Receiving {
        count: u16,
        items: Vec<MissionItem>,
        deadline: Instant,
        retries_left: usize,
    },
}

impl MissionDownloadHandler {
    /// Creates a handler consuming requests from the receiving side of the `mission_download`
    /// endpoint queue.
    pub fn new(requests: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            requests,
            timeout: MISSION_PROTOCOL_TIMEOUT,
            retries: MISSION_PROTOCOL_RETRIES,
            state: DownloadState::Idle,
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
        !matches!(self.state, DownloadState::Idle)
    }

    fn request_list(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let (target_system, target_component) = ctx.vehicle();
        ctx.send_to_plane(&MissionRequestList {
            target_system,
            target_component,
            mission_type: MavMissionType::Mission,
        })?;
        Ok(())
    }

    fn request_item(&self, seq: u16, ctx: &HandlerContext<'_>) -> Result<()> {
        let (target_system, target_component) = ctx.vehicle();
        ctx.send_to_plane(&MissionRequestInt {
            target_system,
            target_component,
            seq,
            mission_type: MavMissionType::Mission,
        })?;
        Ok(())
    }

    fn acknowledge(&self, ctx: &HandlerContext<'_>) -> Result<()> {
        let (target_system, target_component) = ctx.vehicle();
        ctx.send_to_plane(&MissionAck {
            target_system,
            target_component,
            type_: MavMissionResult::MavMissionAccepted,
            mission_type: MavMissionType::Mission,
            ..Default::default()
        })?;
        Ok(())
    }

    fn on_count(&mut self, count: u16, ctx: &HandlerContext<'_>) -> Result<()> {
        if !matches!(self.state, DownloadState::AwaitingCount { .. }) {
            return Ok(());
        }
        log::debug!("[mission_download] vehicle reports {count} items");

        if count == 0 {
            return self.complete(Vec::new(), ctx);
        }

        self.state = DownloadState::Receiving {
            count,
            items: Vec::with_capacity(count as usize),
            deadline: Instant::now() + self.timeout,
            retries_left: self.retries,
        };
        self.request_item(0, ctx)
    }

    fn on_item(&mut self, seq: u16, item: MissionItem, ctx: &HandlerContext<'_>) -> Result<()> {
        let timeout = self.timeout;
        let retries = self.retries;
        let DownloadState::Receiving {
            count,
            items,
            deadline,
            retries_left,
        } = &mut self.state
        else {
            return Ok(());
        };

        if seq as usize != items.len() {
            log::debug!(
                "[mission_download] unexpected item {seq}, waiting for {}",
                items.len()
            );
            return Ok(());
        }

        items.push(item);
        if items.len() == *count as usize {
            let items = std::mem::take(items);
            return self.complete(items, ctx);
        }

        let next = items.len() as u16;
        *deadline = Instant::now() + timeout;
        *retries_left = retries;
        self.request_item(next, ctx)
    }

    fn complete(&mut self, items: Vec<MissionItem>, ctx: &HandlerContext<'_>) -> Result<()> {
        self.state = DownloadState::Idle;
        log::info!("[mission_download] downloaded {} items", items.len());

        self.acknowledge(ctx)?;
        ctx.hub().publish_json(
            PLANE_STATUS,
            &json!({ "mission_download": TransferOutcome::Accepted { count: items.len() } }),
        )?;
        ctx.hub()
            .publish_json(PLANE_MISSION, &json!({ "items": items }))?;
        Ok(())
    }

    fn fail(&mut self, ctx: &HandlerContext<'_>) -> Result<()> {
        self.state = DownloadState::Idle;
        log::warn!("[mission_download] vehicle stopped answering, transfer abandoned");
        ctx.hub().publish_json(
            PLANE_STATUS,
            &json!({ "mission_download": TransferOutcome::Timeout }),
        )?;
        Ok(())
    }
}

impl FrameHandler for MissionDownloadHandler {
    fn name(&self) -> &str {
        "mission_download"
    }

    fn handle(&mut self, frame: &InboundFrame, ctx: &HandlerContext<'_>) -> Result<()> {
        if !frame.is_from_plane() || !self.is_busy() {
            return Ok(());
        }

        match frame.message() {
            Some(Common::MissionCount(msg)) => self.on_count(msg.count, ctx),
            Some(Common::MissionItemInt(msg)) => {
                self.on_item(msg.seq, MissionItem::from(msg), ctx)
            }
            _ => Ok(()),
        }
    }

    fn tick(&mut self, ctx: &HandlerContext<'_>) -> Result<()> {
        let now = Instant::now();

        match &mut self.state {
            DownloadState::Idle => {
                if self.requests.try_recv().is_ok() {
                    log::info!("[mission_download] requesting mission from vehicle");
                    self.state = DownloadState::AwaitingCount {
                        deadline: now + self.timeout,
                        retries_left: self.retries,
                    };
                    self.request_list(ctx)?;
                }
            }
            DownloadState::AwaitingCount {
                deadline,
                retries_left,
            } => {
                if now < *deadline {
                    return Ok(());
                }
                if *retries_left == 0 {
                    return self.fail(ctx);
                }
                *retries_left -= 1;
                *deadline = now + self.timeout;
                self.request_list(ctx)?;
            }
            DownloadState::Receiving {
                items,
                deadline,
                retries_left,
                ..
            } => {
                if now < *deadline {
                    return Ok(());
                }
                if *retries_left == 0 {
                    return self.fail(ctx);
                }
                let next = items.len() as u16;
                *retries_left -= 1;
                *deadline = now + self.timeout;
                self.request_item(next, ctx)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        if self.is_busy() {
            log::warn!("[mission_download] link lost, transfer abandoned");
        }
        self.state = DownloadState::Idle;
    }
}
