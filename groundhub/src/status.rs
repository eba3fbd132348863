//! # Hub status broadcaster
//!
//! Publishes a connectivity map of all hub endpoints on `hub_status` at a fixed period:
//!
//! ```json
//! {"judgingserver": true, "mission_upload": true, "udp:10.0.0.5:40000": true, "sitl": false, "vehicle": true}
//! ```
//!
//! The `"vehicle"` entry follows the MAVLink connection state and is `false` until a
//! [`ManagerHandle`] is attached. The `"sitl"` entry reports whether the simulator answers a
//! [`SitlProbe`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::topics::HUB_STATUS;
use crate::bus::Hub;
use crate::consts::{DEFAULT_STATUS_PERIOD, SITL_PROBE_TIMEOUT};
use crate::mavlink::ManagerHandle;

/// Key of the simulator health entry.
pub const SITL_KEY: &str = "sitl";

/// Key of the vehicle link entry.
pub const VEHICLE_KEY: &str = "vehicle";

/// Health check of the software-in-the-loop simulator.
#[async_trait]
pub trait SitlProbe: Send + Sync + 'static {
    /// Returns `true` if simulator is up.
    async fn is_alive(&self) -> bool;
}

/// Considers the simulator alive if its TCP port accepts connections.
#[derive(Clone, Debug)]
pub struct TcpSitlProbe {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpSitlProbe {
    /// Creates a probe for a simulator listening on `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: SITL_PROBE_TIMEOUT,
        }
    }
}

#[async_trait]
impl SitlProbe for TcpSitlProbe {
    async fn is_alive(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(self.addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Periodic hub status publisher.
pub struct StatusBroadcaster {
    hub: Hub,
    period: Duration,
    sitl: Option<Arc<dyn SitlProbe>>,
    vehicle: Option<ManagerHandle>,
}

impl StatusBroadcaster {
    /// Creates a broadcaster with the default period and without simulator probe.
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            period: DEFAULT_STATUS_PERIOD,
            sitl: None,
            vehicle: None,
        }
    }

    /// Sets broadcast period.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets simulator probe.
    pub fn sitl(mut self, probe: Arc<dyn SitlProbe>) -> Self {
        self.sitl = Some(probe);
        self
    }

    /// Reports vehicle link state of a connection manager.
    pub fn vehicle(mut self, manager: ManagerHandle) -> Self {
        self.vehicle = Some(manager);
        self
    }

    /// Current status map.
    pub async fn snapshot(&self) -> BTreeMap<String, bool> {
        let mut status = self.hub.endpoint_status();
        let vehicle = self
            .vehicle
            .as_ref()
            .is_some_and(|manager| manager.is_connected());
        status.insert(VEHICLE_KEY.to_string(), vehicle);

        let sitl = match &self.sitl {
            Some(probe) => probe.is_alive().await,
            None => false,
        };
        status.insert(SITL_KEY.to_string(), sitl);
        status
    }

    /// Spawns the broadcast loop.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Publishes status every period until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = self.snapshot().await;
            match self.hub.publish_json(HUB_STATUS, &status) {
                Ok(true) => {}
                Ok(false) => log::trace!("[status] broadcast dropped"),
                Err(err) => log::warn!("[status] can't encode status: {err}"),
            }
        }
        log::debug!("[status] broadcaster stopped");
    }
}

impl std::fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("period", &self.period)
            .field("sitl", &self.sitl.is_some())
            .field("vehicle", &self.vehicle.as_ref().map(|manager| manager.state()))
            .finish_non_exhaustive()
    }
}
