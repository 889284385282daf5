//! Blocking frame receiver for the push channel
//!
//! A [`FrameReceiver`] owns one bound UDP socket and a [`Reassembler`].
//! [`FrameReceiver::receive_frame`] loops over datagrams until a complete
//! frame both reassembles and decodes:
//!
//! ```text
//! WaitingBoundary ──▶ Accumulating ──▶ decode ──ok──▶ return artifact
//!        ▲                 │              │
//!        └──── spurious ───┘              └──err──▶ discard, next frame
//! ```
//!
//! Decode failures and discarded partial frames never reach the caller; they
//! are logged and counted (see [`FrameReceiver::discarded_frames`]).

use crate::core::types::Telemetry;
use crate::error::{Error, Result};
use crate::streaming::fragment::{Feed, LossPolicy, Reassembler};
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Receive buffer; larger than any IPv4 UDP payload
const RECV_BUFFER_SIZE: usize = 65_536;

/// Turns reassembled frame bytes into the artifact a caller wants
pub trait FrameDecoder {
    type Output;

    /// Decode one frame; an `Err` discards the frame
    fn decode(&self, frame: &[u8]) -> Result<Self::Output>;
}

/// Accepts any frame as raw bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl FrameDecoder for RawDecoder {
    type Output = Vec<u8>;

    fn decode(&self, frame: &[u8]) -> Result<Vec<u8>> {
        Ok(frame.to_vec())
    }
}

/// Decodes encoded images (JPEG, PNG)
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl FrameDecoder for ImageDecoder {
    type Output = image::DynamicImage;

    fn decode(&self, frame: &[u8]) -> Result<image::DynamicImage> {
        Ok(image::load_from_memory(frame)?)
    }
}

/// Decodes pushed telemetry JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryDecoder;

impl FrameDecoder for TelemetryDecoder {
    type Output = Telemetry;

    fn decode(&self, frame: &[u8]) -> Result<Telemetry> {
        serde_json::from_slice(frame).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Push-channel receiver bound to one UDP port
pub struct FrameReceiver<D: FrameDecoder> {
    socket: UdpSocket,
    decoder: D,
    reassembler: Reassembler,
    buffer: Vec<u8>,
    discarded: u64,
}

impl<D: FrameDecoder> FrameReceiver<D> {
    /// Bind a receiver on `addr`; it resynchronizes before its first frame
    pub fn bind<A: ToSocketAddrs>(addr: A, decoder: D, policy: LossPolicy) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Self::from_socket(socket, decoder, policy))
    }

    /// Wrap an already bound socket
    pub fn from_socket(socket: UdpSocket, decoder: D, policy: LossPolicy) -> Self {
        Self {
            socket,
            decoder,
            reassembler: Reassembler::new(policy),
            buffer: vec![0u8; RECV_BUFFER_SIZE],
            discarded: 0,
        }
    }

    /// Treat the next datagram as the start of a frame
    ///
    /// Use only when the socket was bound before the sender started.
    pub fn assume_aligned(mut self) -> Self {
        self.reassembler = Reassembler::aligned(self.reassembler.policy());
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Bound each socket read; `None` blocks indefinitely
    ///
    /// A read that times out makes [`FrameReceiver::receive_frame`] return
    /// [`Error::Timeout`]; any partial frame is kept for the next call.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Frames dropped so far (spurious datagrams, gaps, decode failures)
    pub fn discarded_frames(&self) -> u64 {
        self.discarded
    }

    pub fn is_aligned(&self) -> bool {
        self.reassembler.is_aligned()
    }

    /// Block until the next frame that decodes successfully
    pub fn receive_frame(&mut self) -> Result<D::Output> {
        loop {
            let n = match self.socket.recv(&mut self.buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(Error::Timeout { attempts: 1 });
                }
                Err(e) => return Err(Error::Io(e)),
            };

            match self.reassembler.feed(&self.buffer[..n]) {
                Feed::Pending => {}
                Feed::Discarded(reason) => {
                    self.discarded += 1;
                    log::warn!("Discarded partial frame: {:?}", reason);
                }
                Feed::Complete(frame) => match self.decoder.decode(&frame) {
                    Ok(artifact) => {
                        log::trace!("Received frame of {} bytes", frame.len());
                        return Ok(artifact);
                    }
                    Err(e) => {
                        self.discarded += 1;
                        log::warn!("Discarded {} byte frame: {}", frame.len(), e);
                    }
                },
            }
        }
    }
}
