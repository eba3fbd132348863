//! Frame handlers of the default pipeline.

mod battery;
mod forward;
mod mission_download;
mod mission_item;
mod mission_upload;
mod progress;
mod telemetry;
mod tracker;

pub use battery::{BatteryHandler, BatteryState};
pub use forward::ForwardHandler;
pub use mission_download::MissionDownloadHandler;
pub use mission_item::{MissionItem, TransferOutcome};
pub use mission_upload::MissionUploadHandler;
pub use progress::MissionProgressHandler;
pub use telemetry::{TelemetryHandler, TimeSeriesWriter};
pub use tracker::{tracker_datagram, AntennaTrackerHandler};
