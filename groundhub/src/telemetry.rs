//! # Vehicle telemetry

use mavio::dialects::common::messages::GlobalPositionInt;
use serde::{Deserialize, Serialize};

use crate::consts::FEET_PER_METER;

/// Aircraft position as reported to the interop server and used for distance computation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above mean sea level in feet.
    pub altitude_msl: f64,
    /// Heading in degrees, `[0, 360)`.
    pub heading: f64,
}

/// Compact aircraft location published on `plane_loc`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Altitude above mean sea level in meters.
    pub alt: f64,
}

const DEG_E7: f64 = 1e7;
const MM_PER_M: f64 = 1e3;
const HEADING_UNKNOWN: u16 = u16::MAX;

impl Telemetry {
    /// Altitude above mean sea level in meters.
    pub fn altitude_m(&self) -> f64 {
        self.altitude_msl / FEET_PER_METER
    }
}

impl From<&GlobalPositionInt> for Telemetry {
    fn from(msg: &GlobalPositionInt) -> Self {
        let heading = if msg.hdg == HEADING_UNKNOWN {
            0.0
        } else {
            msg.hdg as f64 / 100.0
        };

        Self {
            latitude: msg.lat as f64 / DEG_E7,
            longitude: msg.lon as f64 / DEG_E7,
            altitude_msl: msg.alt as f64 / MM_PER_M * FEET_PER_METER,
            heading,
        }
    }
}

impl From<&GlobalPositionInt> for PlaneLocation {
    fn from(msg: &GlobalPositionInt) -> Self {
        Self {
            lat: msg.lat as f64 / DEG_E7,
            lon: msg.lon as f64 / DEG_E7,
            alt: msg.alt as f64 / MM_PER_M,
        }
    }
}

#[cfg(test)]
mod telemetry_tests {
    use super::*;

    fn position() -> GlobalPositionInt {
        GlobalPositionInt {
            lat: 381_450_000,
            lon: -764_270_000,
            alt: 30_480,
            hdg: 9_050,
            ..Default::default()
        }
    }

    #[test]
    fn telemetry_from_global_position() {
        let telemetry = Telemetry::from(&position());

        assert!((telemetry.latitude - 38.145).abs() < 1e-9);
        assert!((telemetry.longitude + 76.427).abs() < 1e-9);
        assert!((telemetry.altitude_msl - 100.0).abs() < 1e-3);
        assert!((telemetry.heading - 90.5).abs() < 1e-9);
        assert!((telemetry.altitude_m() - 30.48).abs() < 1e-6);
    }

    #[test]
    fn unknown_heading_is_zero() {
        let msg = GlobalPositionInt {
            hdg: u16::MAX,
            ..position()
        };
        assert_eq!(Telemetry::from(&msg).heading, 0.0);
    }

    #[test]
    fn plane_location_in_meters() {
        let location = PlaneLocation::from(&position());
        assert!((location.alt - 30.48).abs() < 1e-9);
    }
}
