//! # Groundhub
//!
//! A ground-control hub for an unmanned aircraft. Groundhub sits between a flight vehicle
//! reachable over [MAVLink](https://mavlink.io/en/), an interoperability (judging) server, and any
//! number of observers such as web dashboards or companion computers. It multiplexes, translates
//! and fans out telemetry and command traffic while staying alive when any of these parties
//! drops off the network.
//!
//! The hub is built from three tightly coupled parts:
//!
//! * [`bus`]: a pub/sub message bus of named [`Topic`](bus::Topic)s and
//!   [`Endpoint`](bus::Endpoint)s registered with a [`Hub`](bus::Hub). Delivery is at-most-once,
//!   best-effort and rate limited per subscriber.
//! * [`mavlink`]: a [`ConnectionManager`](mavlink::ConnectionManager) that keeps links to the
//!   vehicle and router targets alive, decodes frames and pushes every frame through an ordered
//!   pipeline of [`FrameHandler`](mavlink::FrameHandler)s.
//! * [`mission`]: a [`MissionReporter`](mission::MissionReporter) that tracks the closest and
//!   current distance from the aircraft to every waypoint and obstacle of the active mission.
//!
//! Around them live the [`interop`] polling client, the [`transport`] adapters (WebSocket and UDP
//! envelope listeners), and the periodic [`status`] broadcaster.
//!
//! Data flows as follows:
//!
//! ```text
//! vehicle ─► ConnectionManager ─► "telemetry" ─► { MissionReporter, WebSocket observers }
//! MissionReporter ─► "mission_status" ─► observers
//! InteropPoller ─► "obstacle_data" ─► { observers, MissionReporter }
//! ```

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod bus;
pub mod conf;
pub mod consts;
pub mod errors;
pub mod interop;
pub mod mavlink;
pub mod mission;
pub mod prelude;
pub mod status;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

#[doc(inline = true)]
pub extern crate mavio;

#[doc(inline = true)]
pub use mavio::dialects;
