use mavio::dialects::common::enums::{MavCmd, MavFrame, MavMissionResult, MavMissionType};
use mavio::dialects::common::messages::MissionItemInt;
use mavio::protocol::{ComponentId, SystemId};
use serde::{Deserialize, Serialize};

const DEG_E7: f64 = 1e7;

/// Waypoint exchanged with the vehicle by the mission protocol.
///
/// Altitude is relative to home, in meters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MissionItem {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude relative to home in meters.
    pub altitude: f32,
    /// Command name. Only reported for downloaded items, uploads are always plain waypoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Outcome of a mission transfer, published on `plane_status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TransferOutcome {
    /// Vehicle accepted the transfer.
    Accepted {
        /// Number of items transferred.
        count: usize,
    },
    /// Vehicle rejected the transfer.
    Rejected {
        /// Mission result reported by the vehicle.
        reason: String,
    },
    /// Vehicle stopped answering.
    Timeout,
}

impl MissionItem {
    pub(crate) fn to_message(
        &self,
        seq: u16,
        (target_system, target_component): (SystemId, ComponentId),
    ) -> MissionItemInt {
        MissionItemInt {
            target_system,
            target_component,
            seq,
            frame: MavFrame::GlobalRelativeAltInt,
            command: MavCmd::NavWaypoint,
            current: 0,
            autocontinue: 1,
            x: (self.latitude * DEG_E7).round() as i32,
            y: (self.longitude * DEG_E7).round() as i32,
            z: self.altitude,
            mission_type: MavMissionType::Mission,
            ..Default::default()
        }
    }
}

impl From<&MissionItemInt> for MissionItem {
    fn from(msg: &MissionItemInt) -> Self {
        Self {
            latitude: msg.x as f64 / DEG_E7,
            longitude: msg.y as f64 / DEG_E7,
            altitude: msg.z,
            command: Some(format!("{:?}", msg.command)),
        }
    }
}

pub(crate) fn is_accepted(result: MavMissionResult) -> bool {
    matches!(result, MavMissionResult::MavMissionAccepted)
}

#[cfg(test)]
mod mission_item_tests {
    use super::*;

    #[test]
    fn waypoint_to_mission_item_int() {
        let item = MissionItem {
            latitude: 38.1462694,
            longitude: -76.4281638,
            altitude: 60.0,
            command: None,
        };
        let msg = item.to_message(3, (1, 1));

        assert_eq!(msg.seq, 3);
        assert_eq!(msg.x, 381_462_694);
        assert_eq!(msg.y, -764_281_638);
        assert_eq!(msg.z, 60.0);
        assert_eq!(msg.target_system, 1);

        let back = MissionItem::from(&msg);
        assert!((back.latitude - item.latitude).abs() < 1e-7);
        assert!(back.command.is_some());
    }

    #[test]
    fn outcome_is_tagged() {
        let outcome = serde_json::to_value(TransferOutcome::Accepted { count: 4 }).unwrap();
        assert_eq!(outcome, serde_json::json!({"status": "accepted", "count": 4}));
    }
}
