use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::topics::{JUDGING_SERVER_ENDPOINT, OBSTACLE_DATA};
use crate::bus::{Endpoint, Hub};
use crate::consts::DEFAULT_OBSTACLE_POLL_RATE;
use crate::interop::InteropApi;
use crate::telemetry::Telemetry;

/// Latest-wins queue of telemetry samples waiting to be reported to the interop server.
///
/// A sample that was not reported yet is replaced by a newer one.
#[derive(Clone, Debug)]
pub struct TelemetryForwarder {
    latest: Arc<watch::Sender<Option<Telemetry>>>,
}

impl TelemetryForwarder {
    fn new() -> (Self, watch::Receiver<Option<Telemetry>>) {
        let (sender, receiver) = watch::channel(None);
        let forwarder = Self {
            latest: Arc::new(sender),
        };
        (forwarder, receiver)
    }

    /// Schedules a sample for reporting without waiting.
    pub fn forward(&self, telemetry: Telemetry) {
        self.latest.send_replace(Some(telemetry));
    }
}

/// Periodically fetches obstacles and reports telemetry to the interop server.
///
/// A ticker enqueues obstacle requests at the configured rate into a single-slot queue, so a
/// tick that finds the previous request unconsumed is skipped. One request loop serves both
/// obstacle requests and telemetry reports. Fetched obstacles are published on `obstacle_data`.
pub struct InteropPoller {
    api: Arc<dyn InteropApi>,
    hub: Hub,
    rate: f64,
    forwarder: TelemetryForwarder,
    telemetry: watch::Receiver<Option<Telemetry>>,
}

impl InteropPoller {
    /// Creates a poller with the default obstacle polling rate.
    pub fn new(api: Arc<dyn InteropApi>, hub: Hub) -> Self {
        let (forwarder, telemetry) = TelemetryForwarder::new();
        Self {
            api,
            hub,
            rate: DEFAULT_OBSTACLE_POLL_RATE,
            forwarder,
            telemetry,
        }
    }

    /// Sets obstacle polling rate in requests per second.
    ///
    /// Non-positive rates disable obstacle polling.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Handle for scheduling telemetry reports.
    pub fn forwarder(&self) -> TelemetryForwarder {
        self.forwarder.clone()
    }

    /// Endpoint representing the judging server on the hub.
    ///
    /// Accepts telemetry JSON payloads and reports whether the interop session is alive.
    pub fn endpoint(&self) -> Arc<JudgingServerEndpoint> {
        Arc::new(JudgingServerEndpoint {
            api: self.api.clone(),
            forwarder: self.forwarder.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Spawns the ticker and the request loop.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let (requests_tx, requests_rx) = mpsc::channel(1);

        if self.rate > 0.0 && self.rate.is_finite() {
            let period = Duration::from_secs_f64(1.0 / self.rate);
            let cancel = cancel.clone();
            tokio::spawn(async move { Self::ticker(period, requests_tx, cancel).await });
        } else {
            log::info!("[interop] obstacle polling disabled");
        }

        tokio::spawn(async move { self.request_loop(requests_rx, cancel).await })
    }

    async fn ticker(period: Duration, requests: mpsc::Sender<()>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match requests.try_send(()) {
                    Ok(_) => {}
                    Err(TrySendError::Full(_)) => log::trace!("[interop] previous poll pending, tick skipped"),
                    Err(TrySendError::Closed(_)) => break,
                },
            }
        }
        log::trace!("[interop] ticker stopped");
    }

    async fn request_loop(mut self, mut requests: mpsc::Receiver<()>, cancel: CancellationToken) {
        let mut requests_open = true;
        log::debug!("[interop] request loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = requests.recv(), if requests_open => match request {
                    Some(_) => self.poll_obstacles().await,
                    None => requests_open = false,
                },
                changed = self.telemetry.changed() => match changed {
                    Ok(_) => self.report_telemetry().await,
                    Err(_) => break,
                },
            }
        }

        log::debug!("[interop] request loop stopped");
    }

    async fn poll_obstacles(&self) {
        match self.api.obstacles().await {
            Ok(obstacles) => match self.hub.publish_json(OBSTACLE_DATA, &obstacles) {
                Ok(true) => {}
                Ok(false) => log::trace!("[interop] obstacle update dropped"),
                Err(err) => log::warn!("[interop] can't encode obstacles: {err}"),
            },
            Err(err) => log::warn!("[interop] can't fetch obstacles: {err}"),
        }
    }

    async fn report_telemetry(&mut self) {
        let telemetry = match *self.telemetry.borrow_and_update() {
            Some(telemetry) => telemetry,
            None => return,
        };

        if let Err(err) = self.api.post_telemetry(&telemetry).await {
            log::warn!("[interop] can't report telemetry: {err}");
        }
    }
}

impl std::fmt::Debug for InteropPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteropPoller")
            .field("rate", &self.rate)
            .finish_non_exhaustive()
    }
}

/// Hub endpoint representing the interop judging server.
pub struct JudgingServerEndpoint {
    api: Arc<dyn InteropApi>,
    forwarder: TelemetryForwarder,
    closed: AtomicBool,
}

impl Endpoint for JudgingServerEndpoint {
    fn name(&self) -> &str {
        JUDGING_SERVER_ENDPOINT
    }

    fn send(&self, payload: &[u8]) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        match serde_json::from_slice::<Telemetry>(payload) {
            Ok(telemetry) => {
                self.forwarder.forward(telemetry);
                true
            }
            Err(err) => {
                log::warn!("[{JUDGING_SERVER_ENDPOINT}] payload is not telemetry: {err}");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.api.is_alive()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for JudgingServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgingServerEndpoint")
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod poller_tests {
    use std::sync::atomic::Ordering as AtomicOrdering;

    use super::*;
    use crate::bus::RateLimit;
    use crate::mission::{MovingObstacle, Obstacles};
    use crate::test_utils::{initialize, FakeInterop};

    fn sample(altitude_msl: f64) -> Telemetry {
        Telemetry {
            latitude: 38.145,
            longitude: -76.427,
            altitude_msl,
            heading: 90.0,
        }
    }

    #[tokio::test]
    async fn obstacles_are_polled_and_published() {
        initialize();
        let hub = Hub::with_default_topics();
        let mut updates = hub.subscribe(OBSTACLE_DATA, RateLimit::Unlimited).unwrap();
        let obstacles = Obstacles {
            moving_obstacles: vec![MovingObstacle {
                latitude: 38.1,
                longitude: -76.4,
                altitude_msl: 200.0,
                sphere_radius: 30.0,
            }],
            ..Default::default()
        };
        let api = Arc::new(FakeInterop::new(Default::default(), obstacles.clone()));

        let cancel = CancellationToken::new();
        let handle = InteropPoller::new(api.clone(), hub)
            .with_rate(50.0)
            .spawn(cancel.clone());

        let update: Obstacles = updates
            .recv_timeout(Duration::from_secs(1))
            .await
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!(update, obstacles);

        cancel.cancel();
        handle.await.unwrap();
        assert!(api.obstacle_requests.load(AtomicOrdering::Acquire) >= 1);
    }

    #[tokio::test]
    async fn only_latest_telemetry_is_reported() {
        initialize();
        let api = Arc::new(FakeInterop::default());
        let poller = InteropPoller::new(api.clone(), Hub::with_default_topics()).with_rate(0.0);
        let forwarder = poller.forwarder();

        // Samples forwarded before the loop runs collapse into the latest one.
        forwarder.forward(sample(100.0));
        forwarder.forward(sample(200.0));

        let cancel = CancellationToken::new();
        let handle = poller.spawn(cancel.clone());
        for _ in 0..100 {
            if !api.posted.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(*api.posted.lock().unwrap(), vec![sample(200.0)]);
    }

    #[tokio::test]
    async fn judging_server_endpoint_forwards_telemetry() {
        let api = Arc::new(FakeInterop::default());
        let poller = InteropPoller::new(api.clone(), Hub::with_default_topics());
        let endpoint = poller.endpoint();

        assert_eq!(endpoint.name(), JUDGING_SERVER_ENDPOINT);
        assert!(endpoint.is_connected());
        assert!(!endpoint.send(b"not telemetry"));
        assert!(endpoint.send(&serde_json::to_vec(&sample(120.0)).unwrap()));

        api.failing.store(true, AtomicOrdering::Release);
        assert!(!endpoint.is_connected());

        api.failing.store(false, AtomicOrdering::Release);
        endpoint.close();
        assert!(!endpoint.is_connected());
        assert!(!endpoint.send(&serde_json::to_vec(&sample(120.0)).unwrap()));
    }
}
