use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bus::topics::{MISSION_STATUS, OBSTACLE_DATA, TELEMETRY};
use crate::bus::{Hub, RateLimit};
use crate::consts::{DEFAULT_REPORT_PERIOD, DISTANCE_SENTINEL};
use crate::interop::{InteropApi, TelemetryForwarder};
use crate::mission::geo::{cylinder_distance, distance, sphere_distance, GeoPoint};
use crate::mission::model::{Mission, Obstacles};
use crate::telemetry::Telemetry;

use crate::prelude::*;

/// Closest and current distance to a mission entity, in feet.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistanceStatus {
    /// Smallest distance observed since the reporter was started.
    pub closest: f64,
    /// Distance computed from the latest telemetry sample.
    pub current: f64,
}

impl Default for DistanceStatus {
    fn default() -> Self {
        Self {
            closest: DISTANCE_SENTINEL,
            current: DISTANCE_SENTINEL,
        }
    }
}

impl DistanceStatus {
    fn update(&mut self, current: f64) {
        self.current = current;
        self.closest = self.closest.min(current);
    }
}

/// Snapshot of distances to all mission entities, published on `mission_status`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MissionStatus {
    /// One entry per waypoint, in mission order.
    pub waypoints: Vec<DistanceStatus>,
    /// One entry per moving obstacle. Distances are to the sphere surface.
    pub moving_obstacles: Vec<DistanceStatus>,
    /// One entry per stationary obstacle. Distances are to the cylinder side.
    pub stationary_obstacles: Vec<DistanceStatus>,
    /// Horizontal distance to the airdrop target.
    pub airdrop: DistanceStatus,
    /// Horizontal distance to the emergent target.
    pub emergent_target: DistanceStatus,
    /// Snapshot publishing rate in Hz.
    pub report_rate: f64,
}

enum ReporterState {
    NotStarted,
    Started(Tracking),
}

struct Tracking {
    mission: Mission,
    obstacles: Obstacles,
    status: MissionStatus,
}

/// Tracks distances from the aircraft to every entity of the active mission.
///
/// The reporter starts in the not-started state. [`MissionReporter::start`] fetches the mission
/// and the obstacle set once and moves it to the started state for good. While started,
/// every telemetry sample updates all distances and every obstacle update replaces the cached
/// obstacle set. [`MissionReporter::run`] drives the reporter from hub topics and publishes
/// snapshots periodically.
///
/// All mission, obstacle, and distance state is guarded by a single mutex.
pub struct MissionReporter {
    api: Arc<dyn InteropApi>,
    hub: Hub,
    mission_id: i64,
    period: Duration,
    forwarder: Option<TelemetryForwarder>,
    state: Mutex<ReporterState>,
}

impl MissionReporter {
    /// Creates a reporter for mission `mission_id` with the default report period.
    pub fn new(api: Arc<dyn InteropApi>, hub: Hub, mission_id: i64) -> Self {
        Self {
            api,
            hub,
            mission_id,
            period: DEFAULT_REPORT_PERIOD,
            forwarder: None,
            state: Mutex::new(ReporterState::NotStarted),
        }
    }

    /// Sets the snapshot period.
    ///
    /// Zero is ignored and the current period is kept.
    pub fn with_period(mut self, period: Duration) -> Self {
        if period.is_zero() {
            log::warn!("[reporter] zero report period ignored, keeping {:?}", self.period);
        } else {
            self.period = period;
        }
        self
    }

    /// Forwards every received telemetry sample to the interop server through `forwarder`.
    pub fn with_forwarder(mut self, forwarder: TelemetryForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    /// Snapshot publishing rate in Hz.
    pub fn report_rate(&self) -> f64 {
        1.0 / self.period.as_secs_f64()
    }

    /// Returns `true` once the mission was fetched.
    pub fn is_started(&self) -> bool {
        matches!(*self.lock(), ReporterState::Started(_))
    }

    /// Fetches the mission and the obstacle set and starts tracking.
    ///
    /// On failure the reporter stays not started and the error is returned. Calling this on a
    /// started reporter does nothing.
    pub async fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        let mission = self.api.mission(self.mission_id).await?;
        let obstacles = self.api.obstacles().await?;

        let status = MissionStatus {
            waypoints: vec![DistanceStatus::default(); mission.mission_waypoints.len()],
            moving_obstacles: vec![DistanceStatus::default(); obstacles.moving_obstacles.len()],
            stationary_obstacles: vec![
                DistanceStatus::default();
                obstacles.stationary_obstacles.len()
            ],
            airdrop: DistanceStatus::default(),
            emergent_target: DistanceStatus::default(),
            report_rate: self.report_rate(),
        };

        let mut state = self.lock();
        if let ReporterState::NotStarted = *state {
            log::info!(
                "[reporter] tracking mission {} with {} waypoints, {} moving and {} stationary obstacles",
                self.mission_id,
                mission.mission_waypoints.len(),
                obstacles.moving_obstacles.len(),
                obstacles.stationary_obstacles.len()
            );
            *state = ReporterState::Started(Tracking {
                mission,
                obstacles,
                status,
            });
        }
        Ok(())
    }

    /// Current distance snapshot.
    ///
    /// Fails with [`Error::NotStarted`] until the reporter is started.
    pub fn status(&self) -> Result<MissionStatus> {
        match &*self.lock() {
            ReporterState::Started(tracking) => Ok(tracking.status.clone()),
            ReporterState::NotStarted => Err(Error::NotStarted),
        }
    }

    /// Recomputes all distances from a telemetry sample.
    ///
    /// Returns `false` if reporter is not started and the sample was ignored.
    pub fn update_telemetry(&self, telemetry: &Telemetry) -> bool {
        let mut state = self.lock();
        let ReporterState::Started(tracking) = &mut *state else {
            return false;
        };

        let own = GeoPoint::new(
            telemetry.latitude,
            telemetry.longitude,
            telemetry.altitude_msl,
        );
        let Tracking {
            mission,
            obstacles,
            status,
        } = tracking;

        for (status, waypoint) in status.waypoints.iter_mut().zip(&mission.mission_waypoints) {
            status.update(distance(&own, &GeoPoint::from(waypoint)));
        }
        for (status, obstacle) in status
            .moving_obstacles
            .iter_mut()
            .zip(&obstacles.moving_obstacles)
        {
            status.update(sphere_distance(
                &own,
                &GeoPoint::from(obstacle),
                obstacle.sphere_radius,
            ));
        }
        for (status, obstacle) in status
            .stationary_obstacles
            .iter_mut()
            .zip(&obstacles.stationary_obstacles)
        {
            let base = GeoPoint::new(obstacle.latitude, obstacle.longitude, 0.0);
            status.update(cylinder_distance(
                &own,
                &base,
                obstacle.cylinder_height,
                obstacle.cylinder_radius,
            ));
        }

        let airdrop = mission.air_drop_pos.at_altitude(own.altitude);
        status.airdrop.update(distance(&own, &airdrop));
        let emergent = mission.emergent_last_known_pos.at_altitude(own.altitude);
        status.emergent_target.update(distance(&own, &emergent));

        true
    }

    /// Replaces the cached obstacle set.
    ///
    /// Distance records of obstacles whose index persists keep their closest value, records of
    /// new indices start from the sentinel. Returns `false` if reporter is not started and the
    /// update was ignored.
    pub fn update_obstacles(&self, obstacles: Obstacles) -> bool {
        let mut state = self.lock();
        let ReporterState::Started(tracking) = &mut *state else {
            return false;
        };

        tracking
            .status
            .moving_obstacles
            .resize(obstacles.moving_obstacles.len(), DistanceStatus::default());
        tracking
            .status
            .stationary_obstacles
            .resize(obstacles.stationary_obstacles.len(), DistanceStatus::default());
        tracking.obstacles = obstacles;

        true
    }

    /// Drives the reporter until `cancel` is triggered.
    ///
    /// Consumes `telemetry` and `obstacle_data` topics and publishes a snapshot on
    /// `mission_status` every report period while started.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let mut telemetry = self.hub.subscribe(TELEMETRY, RateLimit::Unlimited)?;
        let mut obstacles = self.hub.subscribe(OBSTACLE_DATA, RateLimit::Unlimited)?;
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::debug!("[reporter] event loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = obstacles.recv() => match message {
                    Some(message) => match message.decode::<Obstacles>() {
                        Ok(update) => {
                            self.update_obstacles(update);
                        }
                        Err(err) => log::warn!("[reporter] malformed obstacle update: {err}"),
                    },
                    None => break,
                },
                message = telemetry.recv() => match message {
                    Some(message) => match message.decode::<Telemetry>() {
                        Ok(sample) => {
                            self.update_telemetry(&sample);
                            if let Some(forwarder) = &self.forwarder {
                                forwarder.forward(sample);
                            }
                        }
                        Err(err) => log::warn!("[reporter] malformed telemetry: {err}"),
                    },
                    None => break,
                },
                _ = ticker.tick() => self.publish(),
            }
        }

        log::debug!("[reporter] event loop stopped");
        Ok(())
    }

    fn publish(&self) {
        let status = match self.status() {
            Ok(status) => status,
            Err(_) => return,
        };

        match self.hub.publish_json(MISSION_STATUS, &status) {
            Ok(true) => {}
            Ok(false) => log::trace!("[reporter] snapshot dropped"),
            Err(err) => log::warn!("[reporter] can't encode snapshot: {err}"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MissionReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionReporter")
            .field("mission_id", &self.mission_id)
            .field("period", &self.period)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
