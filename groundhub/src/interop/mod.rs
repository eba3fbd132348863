//! # Interop server client
//!
//! [`InteropClient`] talks to the competition judging server over HTTP. [`InteropPoller`] keeps
//! fetching obstacles and reports aircraft positions without ever blocking the rest of the hub.

mod client;
mod poller;

pub use client::{InteropApi, InteropClient, InteropConf};
pub use poller::{InteropPoller, JudgingServerEndpoint, TelemetryForwarder};
