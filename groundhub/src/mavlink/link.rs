use std::fmt::{Debug, Formatter};

use mavio::dialects::Common;
use mavio::error::{FrameError, IoErrorKind};
use mavio::io::{TokioReader, TokioWriter};
use mavio::{AsyncReceiver, AsyncSender};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::consts::LINK_OUTBOUND_CAPACITY;
use crate::mavlink::udp_rw::UdpRW;
use crate::mavlink::TransportDescriptor;

use crate::prelude::*;

/// Index of a link within the current link set. The vehicle link is always `0`.
pub type LinkId = usize;

/// `ID` of the vehicle link.
pub const PLANE_LINK: LinkId = 0;

/// Event produced by link reader and writer tasks.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// Valid frame received.
    Frame {
        link: LinkId,
        frame: Frame<Versionless>,
    },
    /// Bytes which do not form a valid frame were received.
    Invalid { link: LinkId, error: Error },
    /// Link is broken.
    Closed { link: LinkId, error: Error },
}

/// Established low-level MAVLink transport.
///
/// Owns a reader and a writer task. Both stop once the cancellation token passed to
/// [`Link::connect`] is cancelled, or once the transport fails.
pub(crate) struct Link {
    id: LinkId,
    descriptor: TransportDescriptor,
    outbound: mpsc::Sender<Frame<Versionless>>,
}

impl Link {
    /// Establishes a link and spawns its reader and writer tasks.
    pub(crate) async fn connect(
        id: LinkId,
        descriptor: TransportDescriptor,
        events: mpsc::Sender<LinkEvent>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        log::debug!("[{descriptor}] connecting link #{id}");

        let link = match &descriptor {
            #[cfg(feature = "serial")]
            TransportDescriptor::Serial { path, baud_rate } => {
                use tokio_serial::SerialPortBuilderExt;

                let port = tokio_serial::new(path, *baud_rate).open_native_async()?;
                let (reader, writer) = tokio::io::split(port);
                Self::spawn(id, descriptor.clone(), reader, writer, events, cancel)
            }
            #[cfg(not(feature = "serial"))]
            TransportDescriptor::Serial { .. } => {
                return Err(Error::Descriptor {
                    descriptor: descriptor.to_string(),
                    reason: "serial support is disabled",
                });
            }
            TransportDescriptor::Udp { bind_addr } => {
                let socket = UdpSocket::bind(bind_addr.as_str()).await?;
                let (reader, writer) = UdpRW::pair(socket);
                Self::spawn(id, descriptor.clone(), reader, writer, events, cancel)
            }
            TransportDescriptor::Tcp { remote_addr } => {
                let stream = TcpStream::connect(remote_addr.as_str()).await?;
                let (reader, writer) = stream.into_split();
                Self::spawn(id, descriptor.clone(), reader, writer, events, cancel)
            }
        };

        log::info!("[{descriptor}] link #{id} established");
        Ok(link)
    }

    /// Link without transport tasks. Frames sent to it end up in the returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(
        id: LinkId,
        descriptor: TransportDescriptor,
    ) -> (Self, mpsc::Receiver<Frame<Versionless>>) {
        let (outbound, outbound_rx) = mpsc::channel(LINK_OUTBOUND_CAPACITY);
        let link = Self {
            id,
            descriptor,
            outbound,
        };
        (link, outbound_rx)
    }

    /// Link `ID`.
    pub(crate) fn id(&self) -> LinkId {
        self.id
    }

    /// Descriptor this link was established from.
    pub(crate) fn descriptor(&self) -> &TransportDescriptor {
        &self.descriptor
    }

    /// Enqueues a frame for writing. Returns `false` if frame was dropped.
    pub(crate) fn send(&self, frame: Frame<Versionless>) -> bool {
        match self.outbound.try_send(frame) {
            Ok(_) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("[{}] outbound queue is full, frame dropped", self.descriptor);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn spawn<R, W>(
        id: LinkId,
        descriptor: TransportDescriptor,
        reader: R,
        writer: W,
        events: mpsc::Sender<LinkEvent>,
        cancel: CancellationToken,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(LINK_OUTBOUND_CAPACITY);

        {
            let descriptor = descriptor.clone();
            let events = events.clone();
            let cancel = cancel.clone();
            let frame_writer = AsyncSender::new(TokioWriter::new(writer));

            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    res = Self::write_handler(&descriptor, outbound_rx, frame_writer) => {
                        if let Err(error) = res {
                            log::debug!("[{descriptor}] write handler finished with error: {error:?}");
                            let _ = events.send(LinkEvent::Closed { link: id, error }).await;
                        }
                    }
                }
                log::trace!("[{descriptor}] write handler stopped");
            });
        }

        {
            let descriptor = descriptor.clone();
            let frame_reader = AsyncReceiver::new(TokioReader::new(reader));

            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    res = Self::read_handler(id, &descriptor, frame_reader, &events) => {
                        if let Err(error) = res {
                            log::debug!("[{descriptor}] read handler finished with error: {error:?}");
                            let _ = events.send(LinkEvent::Closed { link: id, error }).await;
                        }
                    }
                }
                log::trace!("[{descriptor}] read handler stopped");
            });
        }

        Self {
            id,
            descriptor,
            outbound,
        }
    }

    async fn write_handler<W: AsyncWrite + Unpin>(
        descriptor: &TransportDescriptor,
        mut outbound: mpsc::Receiver<Frame<Versionless>>,
        mut frame_writer: AsyncSender<std::io::Error, TokioWriter<W>, Versionless>,
    ) -> Result<()> {
        while let Some(frame) = outbound.recv().await {
            loop {
                if let Err(err) = frame_writer.send(&frame).await {
                    let err = Error::from(err);
                    if let Error::Mavlink(mavio::error::Error::Io(io_err)) = &err {
                        if let IoErrorKind::Std(std::io::ErrorKind::TimedOut) = io_err.kind() {
                            continue;
                        }
                    }
                    if err.is_transport() {
                        return Err(err);
                    }
                    log::warn!("[{descriptor}] can't write frame: {err:?}");
                }
                log::trace!("[{descriptor}] written outgoing frame");
                break;
            }
        }
        Ok(())
    }

    async fn read_handler<R: AsyncRead + Unpin>(
        id: LinkId,
        descriptor: &TransportDescriptor,
        mut frame_reader: AsyncReceiver<std::io::Error, TokioReader<R>, Versionless>,
        events: &mpsc::Sender<LinkEvent>,
    ) -> Result<()> {
        loop {
            let event = match frame_reader.recv().await {
                Ok(frame) => match frame.validate_checksum::<Common>() {
                    // Frames outside the `common` dialect can't be validated and are routed as is.
                    Ok(_) | Err(mavio::error::Error::Frame(FrameError::NotInDialect(_))) => {
                        log::trace!("[{descriptor}] received incoming frame");
                        LinkEvent::Frame { link: id, frame }
                    }
                    Err(err) => LinkEvent::Invalid {
                        link: id,
                        error: Error::from(err),
                    },
                },
                Err(err) => {
                    let err = Error::from(err);
                    if let Error::Mavlink(mavio::error::Error::Io(io_err)) = &err {
                        if let IoErrorKind::Std(std::io::ErrorKind::TimedOut) = io_err.kind() {
                            continue;
                        }
                    }
                    if err.is_transport() {
                        return Err(err);
                    }
                    LinkEvent::Invalid {
                        link: id,
                        error: err,
                    }
                }
            };

            if events.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
}

impl Debug for Link {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
