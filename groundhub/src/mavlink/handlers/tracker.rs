use std::net::SocketAddr;

use mavio::dialects::common::messages::GlobalPositionInt;
use mavio::dialects::Common;
use tokio::net::UdpSocket;

use crate::mavlink::{FrameHandler, HandlerContext, InboundFrame};
use crate::telemetry::PlaneLocation;

use crate::prelude::*;

/// Sends every vehicle position to an antenna tracker as a single UDP datagram.
///
/// The datagram is ASCII `"<lat>,<lon>,<alt_m>"` with altitude above mean sea level in meters.
/// Each datagram is sent from a fresh socket in a spawned task, errors are logged only.
#[derive(Clone, Debug)]
pub struct AntennaTrackerHandler {
    addr: SocketAddr,
}

impl AntennaTrackerHandler {
    /// Creates a handler sending positions to `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

/// Formats an antenna tracker datagram.
pub fn tracker_datagram(msg: &GlobalPositionInt) -> String {
    let location = PlaneLocation::from(msg);
    format!("{},{},{}", location.lat, location.lon, location.alt)
}

impl FrameHandler for AntennaTrackerHandler {
    fn name(&self) -> &str {
        "antenna_tracker"
    }

    fn handle(&mut self, frame: &InboundFrame, _: &HandlerContext<'_>) -> Result<()> {
        let msg = match frame.message() {
            Some(Common::GlobalPositionInt(msg)) if frame.is_from_plane() => msg,
            _ => return Ok(()),
        };

        let datagram = tracker_datagram(msg);
        let addr = self.addr;
        tokio::spawn(async move {
            let bind_addr: SocketAddr = if addr.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };

            let res = async {
                let socket = UdpSocket::bind(bind_addr).await?;
                socket.send_to(datagram.as_bytes(), addr).await?;
                Ok::<(), Error>(())
            }
            .await;

            if let Err(err) = res {
                log::debug!("[antenna_tracker] can't send position to {addr}: {err:?}");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tracker_tests {
    use super::*;

    #[test]
    fn datagram_format() {
        let msg = GlobalPositionInt {
            lat: 381_450_000,
            lon: -764_270_000,
            alt: 30_500,
            ..Default::default()
        };
        assert_eq!(tracker_datagram(&msg), "38.145,-76.427,30.5");
    }
}
