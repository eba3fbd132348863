use std::fmt::{Debug, Display, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mavio::dialects::Common;
use mavio::protocol::{ComponentId, SystemId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::topics::{MISSION_DOWNLOAD_ENDPOINT, MISSION_UPLOAD_ENDPOINT};
use crate::bus::{Endpoint, Hub, QueueEndpoint};
use crate::consts::{
    CONTROL_CHAN_CAPACITY, DEFAULT_DECODE_ERROR_THRESHOLD, DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_VEHICLE_COMPONENT_ID, DEFAULT_VEHICLE_SYSTEM_ID, LINK_EVENTS_CAPACITY,
    MISSION_REQUEST_CAPACITY, PIPELINE_TICK_INTERVAL,
};
use crate::mavlink::handler::FrameFactory;
use crate::mavlink::handlers::{
    AntennaTrackerHandler, BatteryHandler, BatteryState, ForwardHandler, MissionDownloadHandler,
    MissionProgressHandler, MissionUploadHandler, TelemetryHandler, TimeSeriesWriter,
};
use crate::mavlink::link::{Link, LinkEvent, PLANE_LINK};
use crate::mavlink::router::LinkSet;
use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame, TransportDescriptor};

use crate::prelude::*;

/// Liveness of the vehicle connection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No links (initial state).
    #[default]
    Disconnected,
    /// Links are being established.
    Connecting,
    /// All links are up and frames flow through the pipeline.
    Connected,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(state)
    }
}

/// Connection manager configuration.
#[derive(Clone, Debug)]
pub struct ManagerConf {
    /// Vehicle link.
    pub plane: TransportDescriptor,
    /// Router targets. Every frame is forwarded between the vehicle and all of them.
    pub routers: Vec<TransportDescriptor>,
    /// Fixed interval between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Consecutive invalid frames tolerated before links are rebuilt.
    pub decode_error_threshold: usize,
}

impl ManagerConf {
    /// Creates configuration for a vehicle link without router targets.
    pub fn new(plane: TransportDescriptor) -> Self {
        Self {
            plane,
            routers: Vec::new(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            decode_error_threshold: DEFAULT_DECODE_ERROR_THRESHOLD,
        }
    }

    /// Sets router targets.
    pub fn routers(mut self, routers: Vec<TransportDescriptor>) -> Self {
        self.routers = routers;
        self
    }

    /// Sets reconnection interval.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Sets decode error threshold.
    pub fn decode_error_threshold(mut self, threshold: usize) -> Self {
        self.decode_error_threshold = threshold;
        self
    }
}

/// Options of the default frame pipeline.
#[derive(Clone, Debug, Default)]
pub struct PipelineConf {
    /// Antenna tracker address.
    pub tracker: Option<SocketAddr>,
    /// Telemetry time-series sink.
    pub writer: Option<Arc<dyn TimeSeriesWriter>>,
    /// Mission protocol answer timeout and retransmissions, if not default.
    pub mission_protocol: Option<(Duration, usize)>,
}

/// Queue endpoint served by a pipeline handler. Reachable only while the vehicle link is up.
///
/// Requests sent while the vehicle is away are queued and picked up once links are established.
#[derive(Debug)]
struct VehicleEndpoint {
    queue: Arc<QueueEndpoint>,
    state: watch::Receiver<ConnectionState>,
}

impl Endpoint for VehicleEndpoint {
    fn name(&self) -> &str {
        self.queue.name()
    }

    fn send(&self, payload: &[u8]) -> bool {
        self.queue.send(payload)
    }

    fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected && self.queue.is_connected()
    }

    fn close(&self) {
        self.queue.close();
    }
}

enum Control {
    UpdateEndpoints {
        plane: TransportDescriptor,
        routers: Vec<TransportDescriptor>,
    },
}

enum Outcome {
    Shutdown,
    Rebuild,
    Failed,
}

/// Keeps MAVLink links to the vehicle and router targets alive.
///
/// The manager owns an ordered pipeline of [`FrameHandler`]s and runs it for every frame received
/// on any link. Whenever a link can't be established, breaks, or produces too many invalid frames
/// in a row, all links are torn down and rebuilt after a fixed interval. This repeats until
/// [`ManagerHandle::shutdown`] is called.
///
/// Use [`ManagerHandle`] returned by [`ConnectionManager::new`] to observe and control a running
/// manager.
pub struct ConnectionManager {
    conf: ManagerConf,
    hub: Hub,
    handlers: Vec<Box<dyn FrameHandler>>,
    factory: FrameFactory,
    vehicle: (SystemId, ComponentId),
    battery: Option<watch::Receiver<Option<BatteryState>>>,
    state: watch::Sender<ConnectionState>,
    control: mpsc::Receiver<Control>,
    control_open: bool,
    cancel: CancellationToken,
}

/// Handle to a [`ConnectionManager`].
#[derive(Clone, Debug)]
pub struct ManagerHandle {
    control: mpsc::Sender<Control>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Creates a manager with an empty pipeline and its handle.
    pub fn new(conf: ManagerConf, hub: Hub) -> (Self, ManagerHandle) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHAN_CAPACITY);
        let cancel = CancellationToken::new();

        let manager = Self {
            conf,
            hub,
            handlers: Vec::new(),
            factory: FrameFactory::default(),
            vehicle: (DEFAULT_VEHICLE_SYSTEM_ID, DEFAULT_VEHICLE_COMPONENT_ID),
            battery: None,
            state: state_tx,
            control: control_rx,
            control_open: true,
            cancel: cancel.clone(),
        };
        let handle = ManagerHandle {
            control: control_tx,
            state: state_rx,
            cancel,
        };

        (manager, handle)
    }

    /// Appends a handler to the pipeline.
    pub fn with_handler(mut self, handler: impl FrameHandler) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Appends the default pipeline.
    ///
    /// In order: forward to other links, telemetry, mission upload, mission download, mission
    /// progress, antenna tracker (if configured), battery cache. Registers `mission_upload` and
    /// `mission_download` endpoints with the hub.
    pub fn with_default_pipeline(mut self, conf: PipelineConf) -> Self {
        let (upload_endpoint, upload_requests) =
            QueueEndpoint::new(MISSION_UPLOAD_ENDPOINT, MISSION_REQUEST_CAPACITY);
        let (download_endpoint, download_requests) =
            QueueEndpoint::new(MISSION_DOWNLOAD_ENDPOINT, MISSION_REQUEST_CAPACITY);
        for queue in [upload_endpoint, download_endpoint] {
            self.hub.register_endpoint(Arc::new(VehicleEndpoint {
                queue,
                state: self.state.subscribe(),
            }));
        }

        let mut telemetry = TelemetryHandler::new();
        if let Some(writer) = conf.writer {
            telemetry = telemetry.with_writer(writer);
        }
        let (battery, battery_rx) = BatteryHandler::new();
        self.battery = Some(battery_rx);

        let mut upload = MissionUploadHandler::new(upload_requests);
        let mut download = MissionDownloadHandler::new(download_requests);
        if let Some((timeout, retries)) = conf.mission_protocol {
            upload = upload.with_protocol(timeout, retries);
            download = download.with_protocol(timeout, retries);
        }

        let mut manager = self
            .with_handler(ForwardHandler)
            .with_handler(telemetry)
            .with_handler(upload)
            .with_handler(download)
            .with_handler(MissionProgressHandler::default());
        if let Some(addr) = conf.tracker {
            manager = manager.with_handler(AntennaTrackerHandler::new(addr));
        }
        manager.with_handler(battery)
    }

    /// Receiver of the cached vehicle battery state, if the default pipeline is installed.
    pub fn battery(&self) -> Option<watch::Receiver<Option<BatteryState>>> {
        self.battery.clone()
    }

    /// Spawns [`ConnectionManager::listen`] on the current Tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.listen())
    }

    /// Maintains links and runs the pipeline until shutdown.
    pub async fn listen(mut self) {
        log::info!("[manager] listening, vehicle at {}", self.conf.plane);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let generation = self.cancel.child_token();
            let (events_tx, mut events_rx) = mpsc::channel(LINK_EVENTS_CAPACITY);

            let outcome = match self.connect(&events_tx, &generation).await {
                Ok(links) => {
                    drop(events_tx);
                    self.set_state(ConnectionState::Connected);
                    self.serve(&links, &mut events_rx).await
                }
                Err(err) => {
                    log::warn!("[manager] can't establish links: {err}");
                    Outcome::Failed
                }
            };

            generation.cancel();
            for handler in self.handlers.iter_mut() {
                handler.reset();
            }
            self.set_state(ConnectionState::Disconnected);

            match outcome {
                Outcome::Shutdown => break,
                Outcome::Rebuild => continue,
                Outcome::Failed => {
                    if !self.backoff().await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        log::info!("[manager] stopped");
    }

    async fn connect(
        &self,
        events: &mpsc::Sender<LinkEvent>,
        generation: &CancellationToken,
    ) -> Result<LinkSet> {
        let descriptors = std::iter::once(&self.conf.plane).chain(self.conf.routers.iter());

        let mut links = Vec::with_capacity(self.conf.routers.len() + 1);
        for (id, descriptor) in descriptors.enumerate() {
            let link = Link::connect(id, descriptor.clone(), events.clone(), generation.clone())
                .await
                .map_err(|err| {
                    log::debug!("[{descriptor}] can't connect link #{id}: {err:?}");
                    err
                })?;
            links.push(link);
        }

        let links = LinkSet::new(links);
        log::info!(
            "[manager] connected {} links: {}",
            links.len(),
            links.descriptors().collect::<Vec<_>>().join(", ")
        );
        Ok(links)
    }

    async fn serve(&mut self, links: &LinkSet, events: &mut mpsc::Receiver<LinkEvent>) -> Outcome {
        let cancel = self.cancel.clone();
        let mut invalid_streak = 0usize;
        let mut ticker = tokio::time::interval(PIPELINE_TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Outcome::Shutdown,
                control = self.control.recv(), if self.control_open => match control {
                    Some(control) => {
                        self.apply(control);
                        return Outcome::Rebuild;
                    }
                    None => self.control_open = false,
                },
                event = events.recv() => match event {
                    Some(LinkEvent::Frame { link, frame }) => {
                        let frame = InboundFrame::new(link, frame);
                        if frame.is_malformed() {
                            invalid_streak += 1;
                            log::debug!("[manager] malformed payload in {frame:?}");
                        } else {
                            invalid_streak = 0;
                            self.on_frame(links, frame);
                        }
                    }
                    Some(LinkEvent::Invalid { link, error }) => {
                        invalid_streak += 1;
                        log::debug!("[manager] invalid frame on link #{link}: {error:?}");
                    }
                    Some(LinkEvent::Closed { link, error }) => {
                        log::warn!("[manager] link #{link} is broken: {error}");
                        return Outcome::Failed;
                    }
                    None => return Outcome::Failed,
                },
                _ = ticker.tick() => self.on_tick(links),
            }

            if invalid_streak > self.conf.decode_error_threshold {
                log::warn!("[manager] {invalid_streak} invalid frames in a row, rebuilding links");
                return Outcome::Failed;
            }
        }
    }

    fn on_frame(&mut self, links: &LinkSet, frame: InboundFrame) {
        if frame.link() == PLANE_LINK {
            if let Some(Common::Heartbeat(_)) = frame.message() {
                let vehicle = (frame.frame().system_id(), frame.frame().component_id());
                if vehicle != self.vehicle {
                    log::info!("[manager] vehicle identified as {}:{}", vehicle.0, vehicle.1);
                    self.vehicle = vehicle;
                }
            }
        }

        let ctx = HandlerContext::new(&self.hub, links, &self.factory, self.vehicle);
        for handler in self.handlers.iter_mut() {
            if let Err(err) = handler.handle(&frame, &ctx) {
                log::warn!("[{}] can't handle {frame:?}: {err}", handler.name());
            }
        }
    }

    fn on_tick(&mut self, links: &LinkSet) {
        let ctx = HandlerContext::new(&self.hub, links, &self.factory, self.vehicle);
        for handler in self.handlers.iter_mut() {
            if let Err(err) = handler.tick(&ctx) {
                log::warn!("[{}] housekeeping failed: {err}", handler.name());
            }
        }
    }

    /// Waits for the reconnection interval. Returns `false` on shutdown.
    ///
    /// An endpoint update received while waiting is applied and ends the wait.
    async fn backoff(&mut self) -> bool {
        let cancel = self.cancel.clone();
        let deadline = tokio::time::Instant::now() + self.conf.reconnect_interval;
        log::debug!(
            "[manager] reconnecting in {:?}",
            self.conf.reconnect_interval
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return false,
                control = self.control.recv(), if self.control_open => match control {
                    Some(control) => {
                        self.apply(control);
                        return true;
                    }
                    None => self.control_open = false,
                },
                _ = tokio::time::sleep_until(deadline) => return true,
            }
        }
    }

    fn apply(&mut self, control: Control) {
        match control {
            Control::UpdateEndpoints { plane, routers } => {
                log::info!(
                    "[manager] endpoints updated, vehicle at {plane}, {} router targets",
                    routers.len()
                );
                self.conf.plane = plane;
                self.conf.routers = routers;
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("[manager] {previous} -> {state}");
        }
    }
}

impl Debug for ConnectionManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("conf", &self.conf)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ManagerHandle {
    /// Requests replacement of all links.
    ///
    /// Current links are torn down and new ones are established from the provided descriptors.
    pub async fn update_endpoints(
        &self,
        plane: TransportDescriptor,
        routers: Vec<TransportDescriptor>,
    ) -> Result<()> {
        self.control
            .send(Control::UpdateEndpoints { plane, routers })
            .await
            .map_err(|_| Error::ManagerStopped)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns `true` if vehicle link is up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver of connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Waits until manager reaches `state`.
    pub async fn wait_for(&self, state: ConnectionState) -> Result<()> {
        let mut receiver = self.state.clone();
        receiver
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| Error::ManagerStopped)
    }

    /// Stops the manager and tears down all links.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` if shutdown was requested.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Debug for Control {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::UpdateEndpoints { plane, routers } => f
                .debug_struct("UpdateEndpoints")
                .field("plane", plane)
                .field("routers", routers)
                .finish(),
        }
    }
}
