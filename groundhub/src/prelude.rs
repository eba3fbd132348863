//! # Basic imports

pub use crate::errors::{BusError, Error, InteropError, Result};

pub use crate::bus::{Endpoint, Hub, Message, RateLimit, Subscription};
pub use crate::mavlink::{ConnectionManager, ManagerHandle, TransportDescriptor};
pub use crate::mission::MissionReporter;
pub use crate::telemetry::Telemetry;

pub(crate) use mavio::protocol::{Versionless, V2};
pub(crate) use mavio::Frame;
