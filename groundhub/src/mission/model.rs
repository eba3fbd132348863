//! Mission and obstacle documents served by the interop server.
//!
//! Altitudes and radii are in feet.

use serde::{Deserialize, Serialize};

use crate::mission::geo::GeoPoint;

/// Latitude and longitude without altitude.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Mission waypoint.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in feet.
    pub altitude_msl: f64,
    /// Position of the waypoint within the mission.
    #[serde(default)]
    pub order: i32,
}

/// Mission definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    /// Mission `ID`.
    #[serde(default)]
    pub id: i64,
    /// Whether the mission is active on the server.
    #[serde(default)]
    pub active: bool,
    /// Waypoints to fly through.
    #[serde(default)]
    pub mission_waypoints: Vec<Waypoint>,
    /// Airdrop target position.
    #[serde(default)]
    pub air_drop_pos: Position,
    /// Last known position of the emergent target.
    #[serde(default)]
    pub emergent_last_known_pos: Position,
}

/// Moving spherical obstacle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MovingObstacle {
    /// Center latitude in degrees.
    pub latitude: f64,
    /// Center longitude in degrees.
    pub longitude: f64,
    /// Center altitude above mean sea level in feet.
    pub altitude_msl: f64,
    /// Sphere radius in feet.
    pub sphere_radius: f64,
}

/// Stationary cylindrical obstacle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StationaryObstacle {
    /// Axis latitude in degrees.
    pub latitude: f64,
    /// Axis longitude in degrees.
    pub longitude: f64,
    /// Cylinder height in feet.
    pub cylinder_height: f64,
    /// Cylinder radius in feet.
    pub cylinder_radius: f64,
}

/// Current obstacle set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Obstacles {
    /// Moving obstacles.
    #[serde(default)]
    pub moving_obstacles: Vec<MovingObstacle>,
    /// Stationary obstacles.
    #[serde(default)]
    pub stationary_obstacles: Vec<StationaryObstacle>,
}

impl Position {
    /// Point at the given altitude.
    pub fn at_altitude(&self, altitude: f64) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude, altitude)
    }
}

impl From<&Waypoint> for GeoPoint {
    fn from(value: &Waypoint) -> Self {
        GeoPoint::new(value.latitude, value.longitude, value.altitude_msl)
    }
}

impl From<&MovingObstacle> for GeoPoint {
    fn from(value: &MovingObstacle) -> Self {
        GeoPoint::new(value.latitude, value.longitude, value.altitude_msl)
    }
}

#[cfg(test)]
mod model_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mission_from_server_document() {
        let mission: Mission = serde_json::from_value(json!({
            "id": 1,
            "active": true,
            "air_drop_pos": {"latitude": 38.146, "longitude": -76.426},
            "emergent_last_known_pos": {"latitude": 38.145, "longitude": -76.427},
            "mission_waypoints": [
                {"altitude_msl": 200.0, "latitude": 38.142, "longitude": -76.434, "order": 1},
                {"altitude_msl": 300.0, "latitude": 38.143, "longitude": -76.433, "order": 2}
            ],
            "off_axis_odlc_pos": {"latitude": 38.147, "longitude": -76.430}
        }))
        .unwrap();

        assert_eq!(mission.id, 1);
        assert_eq!(mission.mission_waypoints.len(), 2);
        assert_eq!(mission.mission_waypoints[1].order, 2);
        assert_eq!(mission.air_drop_pos.longitude, -76.426);
    }

    #[test]
    fn obstacles_from_server_document() {
        let obstacles: Obstacles = serde_json::from_value(json!({
            "moving_obstacles": [
                {"altitude_msl": 189.5, "latitude": 38.141, "longitude": -76.429, "sphere_radius": 150.0}
            ],
            "stationary_obstacles": [
                {"cylinder_height": 750.0, "cylinder_radius": 300.0, "latitude": 38.140, "longitude": -76.431}
            ]
        }))
        .unwrap();

        assert_eq!(obstacles.moving_obstacles[0].sphere_radius, 150.0);
        assert_eq!(obstacles.stationary_obstacles[0].cylinder_height, 750.0);

        let empty: Obstacles = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, Obstacles::default());
    }
}
