use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use async_trait::async_trait;

use mavio::io::StdIoReader;
use mavio::protocol::{ComponentId, Message as MavlinkMessage, SystemId};
use mavio::Receiver;
use tokio::sync::mpsc;

use crate::bus::Hub;
use crate::interop::InteropApi;
use crate::mavlink::handler::{FrameFactory, HandlerContext};
use crate::mavlink::link::Link;
use crate::mavlink::router::LinkSet;
use crate::mavlink::TransportDescriptor;
use crate::mission::{Mission, Obstacles};

use crate::prelude::*;

static INIT: Once = Once::new();
const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;

pub(crate) const VEHICLE: (SystemId, ComponentId) = (1, 1);

pub(crate) fn initialize() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            // Suppress everything below `warn` for third-party modules
            .filter_level(log::LevelFilter::Warn)
            // Allow everything above `LOG_LEVEL` from current package
            .filter_module(env!("CARGO_PKG_NAME"), LOG_LEVEL)
            .is_test(true)
            .try_init();
    });
}

/// Links without transport: link `0` is the vehicle, others are routers.
pub(crate) struct FakeLinks {
    pub links: LinkSet,
    pub outbound: Vec<mpsc::Receiver<Frame<Versionless>>>,
    pub factory: FrameFactory,
}

impl FakeLinks {
    pub(crate) fn new(count: usize) -> Self {
        let mut links = Vec::with_capacity(count);
        let mut outbound = Vec::with_capacity(count);
        for id in 0..count {
            let descriptor = TransportDescriptor::Tcp {
                remote_addr: format!("127.0.0.1:{}", 14550 + id),
            };
            let (link, rx) = Link::detached(id, descriptor);
            links.push(link);
            outbound.push(rx);
        }

        Self {
            links: LinkSet::new(links),
            outbound,
            factory: FrameFactory::default(),
        }
    }

    pub(crate) fn ctx<'a>(&'a self, hub: &'a Hub) -> HandlerContext<'a> {
        HandlerContext::new(hub, &self.links, &self.factory, VEHICLE)
    }

    /// Frames written to a link so far.
    pub(crate) fn drain(&mut self, link: usize) -> Vec<Frame<Versionless>> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound[link].try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Frame as the vehicle would send it.
pub(crate) fn vehicle_frame<M: MavlinkMessage>(message: &M) -> Frame<Versionless> {
    Frame::builder()
        .sequence(0)
        .system_id(VEHICLE.0)
        .component_id(VEHICLE.1)
        .version(V2)
        .message(message)
        .unwrap()
        .build()
        .into_versionless()
}

/// Same frame with a broken checksum.
pub(crate) fn corrupted(frame: &Frame<Versionless>) -> Frame<Versionless> {
    let mut bytes = vec![0u8; frame.size()];
    frame.serialize(&mut bytes).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;

    let mut receiver: Receiver<std::io::Error, StdIoReader<Cursor<Vec<u8>>>, Versionless> =
        Receiver::new(StdIoReader::new(Cursor::new(bytes)));
    receiver.recv().unwrap()
}

/// In-memory interop server.
#[derive(Debug, Default)]
pub(crate) struct FakeInterop {
    pub mission: Mission,
    pub obstacles: Mutex<Obstacles>,
    pub posted: Mutex<Vec<Telemetry>>,
    pub obstacle_requests: AtomicUsize,
    pub failing: AtomicBool,
}

impl FakeInterop {
    pub(crate) fn new(mission: Mission, obstacles: Obstacles) -> Self {
        Self {
            mission,
            obstacles: Mutex::new(obstacles),
            ..Default::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::Acquire) {
            return Err(InteropError::Status {
                path: "/api".to_string(),
                status: 503,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl InteropApi for FakeInterop {
    async fn mission(&self, _id: i64) -> Result<Mission> {
        self.check()?;
        Ok(self.mission.clone())
    }

    async fn obstacles(&self) -> Result<Obstacles> {
        self.obstacle_requests.fetch_add(1, Ordering::AcqRel);
        self.check()?;
        Ok(self.obstacles.lock().unwrap().clone())
    }

    async fn post_telemetry(&self, telemetry: &Telemetry) -> Result<()> {
        self.check()?;
        self.posted.lock().unwrap().push(*telemetry);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.failing.load(Ordering::Acquire)
    }
}
