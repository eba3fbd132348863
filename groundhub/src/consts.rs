//! # Common constants

use std::time::Duration;

use mavio::protocol::{ComponentId, SystemId};

/// Default capacity of a topic inbox.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;
/// Default capacity of a subscriber outbound queue.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Default fixed interval between MAVLink reconnection attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
/// Default number of consecutive invalid frames tolerated before a link set is rebuilt.
pub const DEFAULT_DECODE_ERROR_THRESHOLD: usize = 64;
/// Baud rate used for `serial:` descriptors which do not specify one.
pub const DEFAULT_SERIAL_BAUD_RATE: u32 = 57_600;

/// System `ID` used by the hub for frames it originates.
pub const GCS_SYSTEM_ID: SystemId = 255;
/// Component `ID` used by the hub for frames it originates (`MAV_COMP_ID_MISSIONPLANNER`).
pub const GCS_COMPONENT_ID: ComponentId = 190;

/// System `ID` targeted by hub-originated commands until the vehicle introduces itself.
pub const DEFAULT_VEHICLE_SYSTEM_ID: SystemId = 1;
/// Component `ID` targeted by hub-originated commands until the vehicle introduces itself.
pub const DEFAULT_VEHICLE_COMPONENT_ID: ComponentId = 1;

/// Time to wait for the vehicle to answer a mission protocol message.
pub const MISSION_PROTOCOL_TIMEOUT: Duration = Duration::from_millis(1500);
/// Retransmissions of a mission protocol message before the transfer is abandoned.
pub const MISSION_PROTOCOL_RETRIES: usize = 5;

/// Default period of mission status snapshots.
pub const DEFAULT_REPORT_PERIOD: Duration = Duration::from_secs(1);
/// Default obstacle polling rate (requests per second).
pub const DEFAULT_OBSTACLE_POLL_RATE: f64 = 5.0;
/// Default period of the hub status broadcast.
pub const DEFAULT_STATUS_PERIOD: Duration = Duration::from_secs(1);
/// Default time after which a silent UDP peer loses its endpoint.
pub const DEFAULT_UDP_PEER_TIMEOUT: Duration = Duration::from_secs(60);

/// Seed of closest/current distances, so the first real sample always improves it.
pub const DISTANCE_SENTINEL: f64 = 1e8;
/// Spherical Earth radius used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;
/// Feet in one meter.
pub const FEET_PER_METER: f64 = 3.280_84;

/// Capacity of the queue of frames waiting to be written to a single link.
pub(crate) const LINK_OUTBOUND_CAPACITY: usize = 256;
/// Capacity of the queue of events produced by all links of a connection manager.
pub(crate) const LINK_EVENTS_CAPACITY: usize = 1024;
/// Interval between pipeline housekeeping ticks (mission protocol timeouts).
pub(crate) const PIPELINE_TICK_INTERVAL: Duration = Duration::from_millis(100);
/// Capacity of the mission upload and download request queues.
pub(crate) const MISSION_REQUEST_CAPACITY: usize = 4;
/// Capacity of the connection manager control queue.
pub(crate) const CONTROL_CHAN_CAPACITY: usize = 8;
/// Maximum UDP datagram size.
pub(crate) const UDP_DATAGRAM_SIZE: usize = 65_536;
/// Timeout for a single interop HTTP request.
pub(crate) const INTEROP_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the SITL health probe.
pub(crate) const SITL_PROBE_TIMEOUT: Duration = Duration::from_millis(250);
