//! UDP fan-out of fragmented frames to registered subscribers
//!
//! # Delivery Modes
//!
//! | Loop | Registry | Port | Payload | Trigger |
//! |------|----------|------|---------|---------|
//! | [`CaptureBroadcaster`] | photo | `photo_port` | encoded image | interval or `send_photo` |
//! | [`TelemetryBroadcaster`] | telemetry | `telemetry_port` | telemetry JSON | interval |
//!
//! Both loops take a registry snapshot per cycle and hand the frame to a
//! [`FramePublisher`], which emits fragments N..1 and, for each fragment,
//! one datagram per destination. Sends are fire-and-forget: a failed
//! `send_to` is logged and the remaining destinations still get the frame.
//! Loops stop when the shared running flag is cleared.

use crate::core::driver::{ActuationDriver, FrameSource, SharedDriver};
use crate::error::Result;
use crate::streaming::fragment::{self, Fragment};
use crate::streaming::registry::SharedRegistry;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Per-frame delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Fragments the frame was split into
    pub fragments: usize,
    /// Datagrams handed to the socket successfully
    pub sent: usize,
    /// Datagrams whose `send_to` failed
    pub failed: usize,
}

/// Splits frames and sends them to a destination list
pub struct FramePublisher {
    socket: UdpSocket,
    max_chunk: usize,
    /// Reused datagram buffer (header + body)
    buffer: Vec<u8>,
}

impl FramePublisher {
    /// Publisher on an existing socket
    pub fn new(socket: UdpSocket, max_chunk: usize) -> Self {
        Self {
            socket,
            max_chunk,
            buffer: Vec::with_capacity(fragment::FRAGMENT_HEADER_LEN + max_chunk),
        }
    }

    /// Publisher on an ephemeral local port (send only)
    pub fn bind_ephemeral(max_chunk: usize) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self::new(socket, max_chunk))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    /// Send `payload` to every destination
    ///
    /// Fails only if the payload cannot be fragmented; per-datagram send
    /// errors are counted in the report.
    pub fn send_frame(&mut self, payload: &[u8], destinations: &[SocketAddr]) -> Result<FrameReport> {
        let fragments = fragment::split(payload, self.max_chunk)?;
        let mut report = FrameReport {
            fragments: fragments.len(),
            ..FrameReport::default()
        };

        for frag in &fragments {
            self.send_fragment(frag, destinations, &mut report);
        }

        log::trace!(
            "Frame of {} bytes: {} fragment(s) to {} destination(s)",
            payload.len(),
            report.fragments,
            destinations.len()
        );
        Ok(report)
    }

    fn send_fragment(&mut self, frag: &Fragment<'_>, destinations: &[SocketAddr], report: &mut FrameReport) {
        frag.encode_into(&mut self.buffer);
        for &dest in destinations {
            match self.socket.send_to(&self.buffer, dest) {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    // UDP send errors are not fatal - log and continue
                    log::warn!(
                        "Failed to send fragment {} to {}: {}",
                        frag.countdown,
                        dest,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
    }
}

/// Periodic capture loop feeding the photo subscribers
///
/// `send_photo` requests arrive on `requests` as the requester's push
/// address; each one triggers an immediate capture that goes to the
/// requester in addition to the current subscribers.
pub struct CaptureBroadcaster {
    publisher: FramePublisher,
    source: Box<dyn FrameSource>,
    registry: SharedRegistry,
    requests: Receiver<SocketAddr>,
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl CaptureBroadcaster {
    pub fn new(
        publisher: FramePublisher,
        source: Box<dyn FrameSource>,
        registry: SharedRegistry,
        requests: Receiver<SocketAddr>,
        running: Arc<AtomicBool>,
        interval: Duration,
    ) -> Self {
        Self {
            publisher,
            source,
            registry,
            requests,
            running,
            interval,
        }
    }

    /// Run until the running flag is cleared
    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "Capture broadcaster started (interval {:?}, {} subscriber(s))",
            self.interval,
            self.registry.len()
        );
        let mut frames = 0u64;

        while self.running.load(Ordering::Relaxed) {
            let mut destinations = Vec::new();
            match self.requests.recv_timeout(self.interval) {
                Ok(addr) => {
                    destinations.push(addr);
                    destinations.extend(self.requests.try_iter());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // The command server drops its sender when it stops
                    if !self.running.load(Ordering::Relaxed) {
                        break;
                    }
                    thread::sleep(self.interval);
                }
            }

            for addr in self.registry.snapshot() {
                if !destinations.contains(&addr) {
                    destinations.push(addr);
                }
            }
            if destinations.is_empty() {
                continue;
            }

            let frame = match self.source.capture() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Capture failed: {}", e);
                    continue;
                }
            };

            match self.publisher.send_frame(&frame, &destinations) {
                Ok(report) => {
                    frames += 1;
                    log::debug!(
                        "Broadcast frame #{} ({} bytes, {} fragments) to {} destination(s)",
                        frames,
                        frame.len(),
                        report.fragments,
                        destinations.len()
                    );
                }
                Err(e) => log::error!("Cannot broadcast {} byte frame: {}", frame.len(), e),
            }
        }

        log::info!("Capture broadcaster stopped ({} frames)", frames);
        Ok(())
    }
}

/// Periodic telemetry push to `add_udp` subscribers
pub struct TelemetryBroadcaster {
    publisher: FramePublisher,
    driver: SharedDriver,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
    interval: Duration,
}

impl TelemetryBroadcaster {
    pub fn new(
        publisher: FramePublisher,
        driver: SharedDriver,
        registry: SharedRegistry,
        running: Arc<AtomicBool>,
        interval: Duration,
    ) -> Self {
        Self {
            publisher,
            driver,
            registry,
            running,
            interval,
        }
    }

    /// Run until the running flag is cleared
    pub fn run(&mut self) -> Result<()> {
        log::info!("Telemetry broadcaster started (interval {:?})", self.interval);

        while self.running.load(Ordering::Relaxed) {
            thread::sleep(self.interval);

            let destinations = self.registry.snapshot();
            if destinations.is_empty() {
                continue;
            }

            // Release the driver lock before serializing and sending
            let telemetry = self.driver.lock().telemetry();
            let telemetry = match telemetry {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("Telemetry read failed: {}", e);
                    continue;
                }
            };

            let payload = serde_json::to_vec(&telemetry)?;
            if let Err(e) = self.publisher.send_frame(&payload, &destinations) {
                log::error!("Cannot push telemetry: {}", e);
            }
        }

        log::info!("Telemetry broadcaster stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::fragment::{Feed, LossPolicy, Reassembler};

    fn receiver() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    fn collect_frame(socket: &UdpSocket) -> Vec<u8> {
        let mut r = Reassembler::aligned(LossPolicy::StrictCountdown);
        let mut buf = vec![0u8; 65_536];
        loop {
            let n = socket.recv(&mut buf).unwrap();
            if let Feed::Complete(frame) = r.feed(&buf[..n]) {
                return frame;
            }
        }
    }

    #[test]
    fn test_send_frame_to_two_destinations() {
        let (a, a_addr) = receiver();
        let (b, b_addr) = receiver();
        let mut publisher = FramePublisher::bind_ephemeral(64).unwrap();

        let payload: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let report = publisher.send_frame(&payload, &[a_addr, b_addr]).unwrap();

        assert_eq!(report.fragments, 16);
        assert_eq!(report.sent, 32);
        assert_eq!(report.failed, 0);
        assert_eq!(collect_frame(&a), payload);
        assert_eq!(collect_frame(&b), payload);
    }

    #[test]
    fn test_datagram_layout() {
        let (a, a_addr) = receiver();
        let mut publisher = FramePublisher::bind_ephemeral(4).unwrap();
        publisher.send_frame(b"abcdefghij", &[a_addr]).unwrap();

        let mut buf = [0u8; 16];
        let mut datagrams = Vec::new();
        for _ in 0..3 {
            let n = a.recv(&mut buf).unwrap();
            datagrams.push(buf[..n].to_vec());
        }
        assert_eq!(
            datagrams,
            vec![b"\x03abcd".to_vec(), b"\x02efgh".to_vec(), b"\x01ij".to_vec()]
        );
    }

    #[test]
    fn test_oversized_frame_sends_nothing() {
        let (a, a_addr) = receiver();
        a.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut publisher = FramePublisher::bind_ephemeral(1).unwrap();

        assert!(publisher.send_frame(&[0u8; 300], &[a_addr]).is_err());
        let mut buf = [0u8; 8];
        assert!(a.recv(&mut buf).is_err());
    }
}
