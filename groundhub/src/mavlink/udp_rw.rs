use std::io::Error;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

use crate::consts::UDP_DATAGRAM_SIZE;

/// A wrapper around a bound [`UdpSocket`] that implements [`AsyncRead`] and [`AsyncWrite`].
///
/// Reads accept datagrams from any peer and remember the last one. Writes go to that peer.
/// Writes issued before any peer was heard from are discarded.
pub(crate) struct UdpRW {
    socket: Arc<UdpSocket>,
    peer: Arc<Mutex<Option<SocketAddr>>>,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
}

impl UdpRW {
    /// Creates a reader and a writer sharing the same socket and peer.
    pub(crate) fn pair(socket: UdpSocket) -> (Self, Self) {
        let socket = Arc::new(socket);
        let peer = Arc::new(Mutex::new(None));

        let reader = Self::new(socket.clone(), peer.clone());
        let writer = Self::new(socket, peer);
        (reader, writer)
    }

    fn new(socket: Arc<UdpSocket>, peer: Arc<Mutex<Option<SocketAddr>>>) -> Self {
        Self {
            socket,
            peer,
            buf: Vec::new(),
            pos: 0,
            len: 0,
        }
    }

    fn peer(&self) -> Option<SocketAddr> {
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AsyncRead for UdpRW {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        if this.pos >= this.len {
            if this.buf.len() < UDP_DATAGRAM_SIZE {
                this.buf.resize(UDP_DATAGRAM_SIZE, 0);
            }

            let mut datagram = ReadBuf::new(this.buf.as_mut_slice());
            let peer = match this.socket.poll_recv_from(cx, &mut datagram) {
                Poll::Ready(Ok(peer)) => peer,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Pending,
            };
            let len = datagram.filled().len();

            *this.peer.lock().unwrap_or_else(PoisonError::into_inner) = Some(peer);
            this.pos = 0;
            this.len = len;
        }

        let available = &this.buf[this.pos..this.len];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.pos += n;

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for UdpRW {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, Error>> {
        match self.peer() {
            Some(peer) => self.socket.poll_send_to(cx, buf, peer),
            None => Poll::Ready(Ok(buf.len())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod udp_rw_tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn writes_before_first_peer_are_dropped() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (_reader, mut writer) = UdpRW::pair(socket);

        writer.write_all(&[1u8; 10]).await.unwrap();
    }

    #[tokio::test]
    async fn replies_go_to_last_peer() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_socket.local_addr().unwrap();
        let (mut reader, mut writer) = UdpRW::pair(server_socket);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[7u8; 4], server_addr).await.unwrap();

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [7u8; 4]);

        writer.write_all(&[9u8; 6]).await.unwrap();
        let mut reply = [0u8; 16];
        let (len, from) = client.recv_from(&mut reply).await.unwrap();
        assert_eq!(from, server_addr);
        assert_eq!(&reply[..len], &[9u8; 6]);
    }

    #[tokio::test]
    async fn datagram_is_read_in_chunks() {
        let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server_socket.local_addr().unwrap();
        let (mut reader, _writer) = UdpRW::pair(server_socket);

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[1, 2, 3, 4, 5, 6], server_addr).await.unwrap();

        let mut head = [0u8; 2];
        let mut tail = [0u8; 4];
        reader.read_exact(&mut head).await.unwrap();
        reader.read_exact(&mut tail).await.unwrap();
        assert_eq!(head, [1, 2]);
        assert_eq!(tail, [3, 4, 5, 6]);
    }
}
