//! Well-known topic and endpoint names.

/// Decoded vehicle telemetry ([`Telemetry`](crate::telemetry::Telemetry)).
pub const TELEMETRY: &str = "telemetry";
/// Compact vehicle location (latitude, longitude, altitude).
pub const PLANE_LOC: &str = "plane_loc";
/// Vehicle status: battery, mission progress and mission transfer results.
pub const PLANE_STATUS: &str = "plane_status";
/// Obstacles fetched from the interop server.
pub const OBSTACLE_DATA: &str = "obstacle_data";
/// Mission distance snapshots.
pub const MISSION_STATUS: &str = "mission_status";
/// Data from the onboard companion computer.
pub const PLANE_OBC_DATA: &str = "plane_obc_data";
/// Mission downloaded from the vehicle.
pub const PLANE_MISSION: &str = "plane_mission";
/// Connectivity of hub endpoints.
pub const HUB_STATUS: &str = "hub_status";

/// All topics created by [`Hub::with_default_topics`](super::Hub::with_default_topics).
pub const DEFAULT_TOPICS: [&str; 8] = [
    TELEMETRY,
    PLANE_LOC,
    PLANE_STATUS,
    OBSTACLE_DATA,
    MISSION_STATUS,
    PLANE_OBC_DATA,
    PLANE_MISSION,
    HUB_STATUS,
];

/// Endpoint accepting waypoint lists to upload to the vehicle.
pub const MISSION_UPLOAD_ENDPOINT: &str = "mission_upload";
/// Endpoint accepting requests to download the mission stored on the vehicle.
pub const MISSION_DOWNLOAD_ENDPOINT: &str = "mission_download";
/// Endpoint representing the interop judging server.
pub const JUDGING_SERVER_ENDPOINT: &str = "judgingserver";
