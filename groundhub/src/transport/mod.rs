//! # Transport adapters
//!
//! Bridges between the [`Hub`](crate::bus::Hub) and remote peers.
//!
//! * [`WebSocketAdapter`] <sup>`websocket`</sup> streams topics to WebSocket clients and treats
//!   every text frame they send as an [`Envelope`](crate::bus::Envelope).
//! * [`UdpListener`] treats every datagram as an envelope and registers its sender as an
//!   endpoint named `udp:<addr>`.

mod udp;
#[cfg(feature = "websocket")]
mod websocket;

pub use udp::{UdpListener, UdpPeerEndpoint};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketAdapter;
