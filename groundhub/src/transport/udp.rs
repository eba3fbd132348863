use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::{Endpoint, Hub};
use crate::consts::{DEFAULT_UDP_PEER_TIMEOUT, UDP_DATAGRAM_SIZE};

use crate::prelude::*;

/// Receives envelopes over UDP.
///
/// Each datagram carries exactly one JSON [`Envelope`](crate::bus::Envelope). The first datagram
/// from a peer registers a [`UdpPeerEndpoint`] named `udp:<addr>`, so other components can
/// answer the peer with [`Hub::send`]. Peers silent for longer than the peer timeout lose their
/// endpoints, the rest are removed when the listener stops.
#[derive(Debug)]
pub struct UdpListener {
    hub: Hub,
    socket: Arc<UdpSocket>,
    peer_timeout: Duration,
}

impl UdpListener {
    /// Binds a listener socket.
    pub async fn bind(addr: impl ToSocketAddrs, hub: Hub) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        log::info!("[udp] listening on {}", socket.local_addr()?);

        Ok(Self {
            hub,
            socket: Arc::new(socket),
            peer_timeout: DEFAULT_UDP_PEER_TIMEOUT,
        })
    }

    /// Sets the time after which a silent peer is forgotten.
    ///
    /// Zero is ignored.
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.peer_timeout = timeout;
        }
        self
    }

    /// Local address of the listener socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns the receive loop.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Receives datagrams until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        let mut buf = vec![0u8; UDP_DATAGRAM_SIZE];
        let mut peers: HashMap<SocketAddr, Instant> = HashMap::new();
        let mut sweep =
            tokio::time::interval((self.peer_timeout / 2).max(Duration::from_millis(1)));

        loop {
            let (len, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sweep.tick() => {
                    self.evict_idle(&mut peers);
                    continue;
                }
                res = self.socket.recv_from(&mut buf) => match res {
                    Ok(received) => received,
                    Err(err) => {
                        // Resets caused by vanished peers are not fatal.
                        log::debug!("[udp] receive error: {err:?}");
                        continue;
                    }
                },
            };

            let name = UdpPeerEndpoint::name_for(peer);
            if peers.insert(peer, Instant::now()).is_none() || self.hub.endpoint(&name).is_none() {
                let endpoint = UdpPeerEndpoint::new(peer, self.socket.clone());
                self.hub.register_endpoint(Arc::new(endpoint));
            }

            self.hub.handle_message(&buf[..len]);
        }

        for peer in peers.into_keys() {
            self.hub.remove_endpoint(&UdpPeerEndpoint::name_for(peer));
        }
        log::debug!("[udp] listener stopped");
    }

    fn evict_idle(&self, peers: &mut HashMap<SocketAddr, Instant>) {
        peers.retain(|peer, last_seen| {
            if last_seen.elapsed() < self.peer_timeout {
                return true;
            }
            log::debug!("[udp] peer {peer} is idle, removing endpoint");
            self.hub.remove_endpoint(&UdpPeerEndpoint::name_for(*peer));
            false
        });
    }
}

/// Endpoint answering a UDP peer with datagrams sent from the listener socket.
#[derive(Debug)]
pub struct UdpPeerEndpoint {
    name: String,
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
    closed: AtomicBool,
}

impl UdpPeerEndpoint {
    fn new(peer: SocketAddr, socket: Arc<UdpSocket>) -> Self {
        Self {
            name: Self::name_for(peer),
            peer,
            socket,
            closed: AtomicBool::new(false),
        }
    }

    /// Endpoint name of a peer.
    pub fn name_for(peer: SocketAddr) -> String {
        format!("udp:{peer}")
    }

    /// Peer address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Endpoint for UdpPeerEndpoint {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn send(&self, payload: &[u8]) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        match self.socket.try_send_to(payload, self.peer) {
            Ok(_) => true,
            Err(err) => {
                log::debug!("[{}] datagram dropped: {err:?}", self.name);
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod udp_tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::bus::topics::PLANE_OBC_DATA;
    use crate::bus::RateLimit;

    #[tokio::test]
    async fn datagrams_are_routed_and_peers_registered() {
        let hub = Hub::with_default_topics();
        let mut subscription = hub.subscribe(PLANE_OBC_DATA, RateLimit::Unlimited).unwrap();

        let listener = UdpListener::bind("127.0.0.1:0", hub.clone()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = listener.spawn(cancel.clone());

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let envelope = json!({"type": "stream", "rec": PLANE_OBC_DATA, "data": {"cpu": 12}});
        peer.send_to(envelope.to_string().as_bytes(), addr)
            .await
            .unwrap();

        let message = subscription
            .recv_timeout(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(message.value(), &json!({"cpu": 12}));

        let name = UdpPeerEndpoint::name_for(peer.local_addr().unwrap());
        assert!(hub.send(&name, b"{\"ack\":true}").unwrap());

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"{\"ack\":true}");

        cancel.cancel();
        handle.await.unwrap();
        assert!(hub.endpoint(&name).is_none());
    }

    #[tokio::test]
    async fn idle_peers_are_evicted() {
        let hub = Hub::with_default_topics();
        let mut subscription = hub.subscribe(PLANE_OBC_DATA, RateLimit::Unlimited).unwrap();

        let listener = UdpListener::bind("127.0.0.1:0", hub.clone())
            .await
            .unwrap()
            .with_peer_timeout(Duration::from_millis(100));
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = listener.spawn(cancel.clone());

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let envelope = json!({"type": "stream", "rec": PLANE_OBC_DATA, "data": {"cpu": 12}});
        peer.send_to(envelope.to_string().as_bytes(), addr)
            .await
            .unwrap();
        subscription
            .recv_timeout(Duration::from_secs(1))
            .await
            .unwrap();

        let name = UdpPeerEndpoint::name_for(peer.local_addr().unwrap());
        assert!(hub.endpoint(&name).is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(hub.endpoint(&name).is_none());

        // A returning peer is registered again.
        peer.send_to(envelope.to_string().as_bytes(), addr)
            .await
            .unwrap();
        subscription
            .recv_timeout(Duration::from_secs(1))
            .await
            .unwrap();
        assert!(hub.endpoint(&name).is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
