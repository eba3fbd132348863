//! Distances between the aircraft and mission entities.
//!
//! All altitudes and distances are in feet. Obstacle distances are measured to the obstacle
//! surface and are negative when the aircraft is inside the obstacle.

use crate::consts::{EARTH_RADIUS_M, FEET_PER_METER};

/// Point in space.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in feet.
    pub altitude: f64,
}

impl GeoPoint {
    /// Creates a point.
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// The same point moved to another altitude.
    pub fn at_altitude(self, altitude: f64) -> Self {
        Self { altitude, ..self }
    }
}

/// Great-circle distance in feet, ignoring altitude.
pub fn horizontal_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c * FEET_PER_METER
}

/// Straight-line distance in feet combining great-circle distance and altitude difference.
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    horizontal_distance(a, b).hypot((a.altitude - b.altitude).abs())
}

/// Signed distance in feet from `own` to the surface of a sphere.
pub fn sphere_distance(own: &GeoPoint, center: &GeoPoint, radius: f64) -> f64 {
    distance(own, center) - radius
}

/// Signed distance in feet from `own` to the side of a cylinder standing on `base`.
///
/// The cylinder axis point is taken at the aircraft altitude, capped by the cylinder height.
pub fn cylinder_distance(own: &GeoPoint, base: &GeoPoint, height: f64, radius: f64) -> f64 {
    let axis = base.at_altitude(height.min(own.altitude));
    distance(own, &axis) - radius
}
