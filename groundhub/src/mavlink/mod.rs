//! # MAVLink connection manager
//!
//! [`ConnectionManager`] keeps one link to the vehicle and one link per router target. Links
//! are described by [`TransportDescriptor`]s (`serial:`, `udp:`, `tcp:`).
//!
//! Every received frame goes through an ordered pipeline of [`FrameHandler`]s. The default
//! pipeline (see [`ConnectionManager::with_default_pipeline`]) forwards frames between links,
//! turns vehicle positions into [`Telemetry`](crate::telemetry::Telemetry), runs mission
//! upload and download transfers, reports mission progress, feeds an antenna tracker and caches
//! battery status.
//!
//! The manager never gives up: any failure tears down all links and rebuilds them after a fixed
//! interval.

mod descriptor;
pub(crate) mod handler;
pub mod handlers;
pub(crate) mod link;
mod manager;
pub(crate) mod router;
mod udp_rw;

pub use descriptor::TransportDescriptor;
pub use handler::{FrameHandler, HandlerContext, InboundFrame};
pub use link::{LinkId, PLANE_LINK};
pub use manager::{ConnectionManager, ConnectionState, ManagerConf, ManagerHandle, PipelineConf};
pub use router::BroadcastScope;
