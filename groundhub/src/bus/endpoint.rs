use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Named destination for point-to-point messages.
///
/// Endpoints receive raw payloads from `send` envelopes and from other hub components. Delivery
/// never blocks: implementations should drop the payload and return `false` if they can't accept
/// it right away.
pub trait Endpoint: Debug + Send + Sync + 'static {
    /// Endpoint name.
    fn name(&self) -> &str;

    /// Delivers a payload. Returns `false` if payload was dropped.
    fn send(&self, payload: &[u8]) -> bool;

    /// Whether the remote side of this endpoint is currently reachable.
    fn is_connected(&self) -> bool;

    /// Closes the endpoint. Subsequent sends are dropped.
    fn close(&self);
}

/// [`Endpoint`] backed by a bounded in-process queue.
///
/// Used to hand payloads over to components which consume them from a [`mpsc::Receiver`].
#[derive(Debug)]
pub struct QueueEndpoint {
    name: String,
    sender: mpsc::Sender<Vec<u8>>,
    closed: AtomicBool,
}

impl QueueEndpoint {
    /// Creates an endpoint and the receiving side of its queue.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let endpoint = Arc::new(Self {
            name: name.into(),
            sender,
            closed: AtomicBool::new(false),
        });
        (endpoint, receiver)
    }
}

impl Endpoint for QueueEndpoint {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn send(&self, payload: &[u8]) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        match self.sender.try_send(payload.to_vec()) {
            Ok(_) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("[{}] queue is full, payload dropped", self.name);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod endpoint_tests {
    use super::*;

    #[test]
    fn queue_endpoint_delivers_until_full() {
        let (endpoint, mut receiver) = QueueEndpoint::new("mission_upload", 2);

        assert!(endpoint.send(b"one"));
        assert!(endpoint.send(b"two"));
        assert!(!endpoint.send(b"three"));

        assert_eq!(receiver.try_recv().unwrap(), b"one");
        assert_eq!(receiver.try_recv().unwrap(), b"two");
    }

    #[test]
    fn closed_queue_endpoint_drops_payloads() {
        let (endpoint, receiver) = QueueEndpoint::new("mission_upload", 2);
        assert!(endpoint.is_connected());

        endpoint.close();
        assert!(!endpoint.is_connected());
        assert!(!endpoint.send(b"late"));

        drop(receiver);
    }

    #[test]
    fn queue_endpoint_disconnects_with_receiver() {
        let (endpoint, receiver) = QueueEndpoint::new("mission_download", 2);
        drop(receiver);

        assert!(!endpoint.is_connected());
        assert!(!endpoint.send(b"{}"));
    }
}
