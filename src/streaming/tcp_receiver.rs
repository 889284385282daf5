//! Control-channel server
//!
//! Accepts one connection at a time, reads a single request, answers it and
//! closes the connection (see [`crate::streaming::wire`] for the byte format).
//!
//! # Dispatch
//!
//! | Command | Handled by | Response |
//! |---------|------------|----------|
//! | `get` | [`ActuationDriver::telemetry`] | telemetry object |
//! | `add_udp` | telemetry registry, `peer_ip:telemetry_port` | `failed` if already registered |
//! | `sub_photo` | photo registry, `peer_ip:photo_port` | `failed` if already registered |
//! | `send_photo` | capture loop request queue | `failed` if the queue is full |
//! | everything else | [`ActuationDriver::execute`] | driver outcome |
//!
//! A driver error is logged and answered with `failed`; the loop keeps going.
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Accept (nonblocking listener, 10ms poll so the running flag is seen)
//! 2. Read until the bytes form a complete request (bounded by a timeout)
//! 3. Dispatch and write the response
//! 4. Close
//! ```
//!
//! Connections are serviced serially, so a slow client delays the next one
//! by at most the request timeout.

use crate::core::driver::{ActuationDriver, SharedDriver};
use crate::core::types::{Command, Response};
use crate::error::{Error, Result};
use crate::streaming::registry::SharedRegistry;
use crate::streaming::wire;
use crossbeam_channel::{Sender, TrySendError};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval of the nonblocking accept loop
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Size of each socket read while assembling a request
const READ_CHUNK: usize = 512;

/// Turns a decoded request into its response
///
/// Subscription keys are derived from the peer's IP and the well-known push
/// ports, so a host holds at most one entry per registry.
pub struct CommandHandler {
    driver: SharedDriver,
    photo_registry: SharedRegistry,
    telemetry_registry: SharedRegistry,
    photo_requests: Sender<SocketAddr>,
    photo_port: u16,
    telemetry_port: u16,
}

impl CommandHandler {
    pub fn new(
        driver: SharedDriver,
        photo_registry: SharedRegistry,
        telemetry_registry: SharedRegistry,
        photo_requests: Sender<SocketAddr>,
        photo_port: u16,
        telemetry_port: u16,
    ) -> Self {
        Self {
            driver,
            photo_registry,
            telemetry_registry,
            photo_requests,
            photo_port,
            telemetry_port,
        }
    }

    /// Execute `cmd` on behalf of `peer`
    pub fn handle(&self, cmd: &Command, peer: SocketAddr) -> Response {
        match cmd {
            Command::Get => match self.driver.lock().telemetry() {
                Ok(telemetry) => Response::Telemetry(Box::new(telemetry)),
                Err(e) => {
                    log::error!("Telemetry read failed: {}", e);
                    Response::Failure
                }
            },
            Command::AddUdp => {
                let addr = SocketAddr::new(peer.ip(), self.telemetry_port);
                Response::from_outcome(self.telemetry_registry.register(addr))
            }
            Command::SubPhoto => {
                let addr = SocketAddr::new(peer.ip(), self.photo_port);
                Response::from_outcome(self.photo_registry.register(addr))
            }
            Command::SendPhoto => {
                let addr = SocketAddr::new(peer.ip(), self.photo_port);
                match self.photo_requests.try_send(addr) {
                    Ok(()) => Response::Success,
                    Err(TrySendError::Full(_)) => {
                        log::warn!("Photo request from {} dropped: queue full", peer);
                        Response::Failure
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        log::warn!("Photo request from {} dropped: capture loop stopped", peer);
                        Response::Failure
                    }
                }
            }
            action => self.execute(action),
        }
    }

    fn execute(&self, cmd: &Command) -> Response {
        let mut driver = self.driver.lock();
        match driver.execute(cmd) {
            Ok(accepted) => {
                if !accepted {
                    log::info!("Vehicle declined '{}'", cmd.name());
                }
                Response::from_outcome(accepted)
            }
            Err(e) => {
                log::error!("Failed to execute '{}': {}", cmd.name(), e);
                Response::Failure
            }
        }
    }
}

/// Serial accept loop for the control channel
pub struct CommandServer {
    listener: TcpListener,
    handler: CommandHandler,
    request_timeout: Duration,
    running: Arc<AtomicBool>,
    buffer: Vec<u8>,
}

impl CommandServer {
    /// Bind the control listener
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: CommandHandler,
        request_timeout: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            handler,
            request_timeout,
            running,
            buffer: Vec::with_capacity(wire::MAX_REQUEST_SIZE),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and service connections until the running flag is cleared
    pub fn run(&mut self) -> Result<()> {
        log::info!("Control server listening on {}", self.local_addr()?);

        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.serve(stream, peer) {
                        log::warn!("Exchange with {} failed: {}", peer, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("Accept error: {}", e);
                }
            }
        }

        log::info!("Control server stopped");
        Ok(())
    }

    /// Service one connection: read one request, answer, close
    fn serve(&mut self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        // Accepted sockets may inherit the listener's nonblocking mode
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(self.request_timeout))?;

        let response = match self.read_request(&mut stream) {
            Ok(cmd) => {
                log::debug!("{} -> {:?}", peer, cmd);
                self.handler.handle(&cmd, peer)
            }
            Err(Error::Protocol(msg)) => {
                log::warn!("Malformed request from {}: {}", peer, msg);
                Response::Failure
            }
            Err(e) => {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(e);
            }
        };

        let bytes = wire::encode_response(&response)?;
        stream.write_all(&bytes)?;
        stream.flush()?;
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    /// Read until the buffered bytes form a complete request
    fn read_request(&mut self, stream: &mut TcpStream) -> Result<Command> {
        self.buffer.clear();
        let deadline = Instant::now() + self.request_timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout { attempts: 1 });
            }
            stream.set_read_timeout(Some(remaining))?;

            match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(Error::Protocol(format!(
                        "Connection closed after {} byte(s) without a complete request",
                        self.buffer.len()
                    )));
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    if self.buffer.len() > wire::MAX_REQUEST_SIZE {
                        return Err(Error::Protocol(format!(
                            "Request exceeds {} bytes",
                            wire::MAX_REQUEST_SIZE
                        )));
                    }
                    if let Some(cmd) = wire::decode_request(&self.buffer)? {
                        return Ok(cmd);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(Error::Timeout { attempts: 1 });
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Telemetry;
    use crate::streaming::registry::SubscriberRegistry;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};

    /// Accepts everything except `land`; counts executed actions
    struct StubDriver {
        executed: Arc<Mutex<Vec<String>>>,
    }

    impl ActuationDriver for StubDriver {
        fn telemetry(&mut self) -> Result<Telemetry> {
            let mut t = Telemetry::default();
            t.position.alt_rel = 3.5;
            Ok(t)
        }

        fn execute(&mut self, cmd: &Command) -> Result<bool> {
            if let Command::Hold = cmd {
                return Err(Error::Other("autopilot link lost".into()));
            }
            self.executed.lock().push(cmd.name().to_string());
            Ok(!matches!(cmd, Command::Land))
        }
    }

    struct Fixture {
        handler: CommandHandler,
        photo: SharedRegistry,
        telemetry: SharedRegistry,
        requests: crossbeam_channel::Receiver<SocketAddr>,
        executed: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let executed = Arc::new(Mutex::new(Vec::new()));
        let driver: SharedDriver = Arc::new(Mutex::new(Box::new(StubDriver {
            executed: Arc::clone(&executed),
        })));
        let photo = SubscriberRegistry::shared();
        let telemetry = SubscriberRegistry::shared();
        let (tx, rx) = crossbeam_channel::bounded(1);
        Fixture {
            handler: CommandHandler::new(
                driver,
                Arc::clone(&photo),
                Arc::clone(&telemetry),
                tx,
                6970,
                6971,
            ),
            photo,
            telemetry,
            requests: rx,
            executed,
        }
    }

    fn peer(last: u8, port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
    }

    #[test]
    fn test_subscriptions_keyed_by_host() {
        let f = fixture();

        assert_eq!(f.handler.handle(&Command::SubPhoto, peer(7, 40001)), Response::Success);
        // Same host, different ephemeral source port
        assert_eq!(f.handler.handle(&Command::SubPhoto, peer(7, 40002)), Response::Failure);
        assert_eq!(f.handler.handle(&Command::SubPhoto, peer(8, 40001)), Response::Success);
        assert_eq!(f.photo.snapshot(), vec![peer(7, 6970), peer(8, 6970)]);

        assert_eq!(f.handler.handle(&Command::AddUdp, peer(7, 40003)), Response::Success);
        assert_eq!(f.handler.handle(&Command::AddUdp, peer(7, 40004)), Response::Failure);
        assert!(f.telemetry.contains(&peer(7, 6971)));
        assert_eq!(f.telemetry.len(), 1);
    }

    #[test]
    fn test_actions_go_to_driver() {
        let f = fixture();
        let takeoff = Command::Takeoff { alt: 10.0 };

        assert_eq!(f.handler.handle(&takeoff, peer(1, 1)), Response::Success);
        assert_eq!(f.handler.handle(&Command::Land, peer(1, 1)), Response::Failure);
        // Driver fault is reported as failure
        assert_eq!(f.handler.handle(&Command::Hold, peer(1, 1)), Response::Failure);
        assert_eq!(*f.executed.lock(), vec!["takeoff", "land"]);
    }

    #[test]
    fn test_get_returns_telemetry() {
        let f = fixture();
        match f.handler.handle(&Command::Get, peer(1, 1)) {
            Response::Telemetry(t) => assert_eq!(t.position.alt_rel, 3.5),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_send_photo_queues_request() {
        let f = fixture();
        assert_eq!(f.handler.handle(&Command::SendPhoto, peer(9, 5000)), Response::Success);
        // Queue holds one pending request
        assert_eq!(f.handler.handle(&Command::SendPhoto, peer(9, 5000)), Response::Failure);
        assert_eq!(f.requests.try_recv().unwrap(), peer(9, 6970));
    }

    fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(request).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_server_answers_and_closes() {
        let f = fixture();
        let running = Arc::new(AtomicBool::new(true));
        let mut server = CommandServer::bind(
            "127.0.0.1:0",
            f.handler,
            Duration::from_millis(300),
            Arc::clone(&running),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = thread::spawn(move || server.run());

        assert_eq!(exchange(addr, br#"{"command":"rtl"}"#), b"success");
        assert_eq!(exchange(addr, br#"{"command":"land"}"#), b"failed");
        assert_eq!(exchange(addr, b"gibberish"), b"failed");

        let telemetry = exchange(addr, b"get\0");
        let parsed: Telemetry = serde_json::from_slice(&telemetry).unwrap();
        assert_eq!(parsed.position.alt_rel, 3.5);

        // A silent client is dropped after the request timeout
        let silent = TcpStream::connect(addr).unwrap();
        assert_eq!(exchange(addr, br#"{"command":"rtl"}"#), b"success");
        drop(silent);

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
        assert_eq!(*f.executed.lock(), vec!["rtl", "land", "rtl"]);
    }
}
