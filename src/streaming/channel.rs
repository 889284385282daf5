//! Connection-per-request command channel
//!
//! Every [`CommandChannel::send`] runs one or more *attempts*. An attempt
//! opens a new TCP connection, writes the JSON command, and waits for a
//! response up to the per-attempt timeout.
//!
//! ```text
//! Idle ──connect+write──▶ AwaitingResponse ──response──▶ Delivered
//!  ▲                             │
//!  └────────── TimedOut ◀────────┘ (stream dropped, same bytes re-sent)
//! ```
//!
//! | Outcome | Retried | Surfaced as |
//! |---------|---------|-------------|
//! | Connect refused / unreachable | never | [`Error::Connection`] |
//! | No response within timeout | until [`RetryPolicy`] is exhausted | [`Error::Timeout`] |
//! | Failure literal | never | [`Response::Failure`] |
//! | Cancel token fired | never | [`Error::Cancelled`] |
//!
//! The TCP stream is owned by a single attempt and closed when it goes out of
//! scope, on every return path.

use crate::config::ClientConfig;
use crate::core::types::{Command, Response};
use crate::error::{Error, Result};
use crate::streaming::wire;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How many times a timed-out exchange is repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per command (`None` = unlimited)
    pub max_attempts: Option<u32>,
    /// Total time budget per command across attempts (`None` = unlimited)
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    /// Retry forever, as long as the peer keeps accepting connections
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            deadline: None,
        }
    }

    /// At most `n` attempts (a value of 0 is treated as 1)
    pub fn attempts(n: u32) -> Self {
        Self {
            max_attempts: Some(n.max(1)),
            deadline: None,
        }
    }

    /// Add a total deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::attempts(5)
    }
}

/// Cooperative cancellation flag shared between a caller and its channels
///
/// Checked before every attempt; an attempt already waiting runs until its
/// own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Request/response client for one control endpoint
#[derive(Debug, Clone)]
pub struct CommandChannel {
    addr: SocketAddr,
    timeout: Duration,
    connect_timeout: Duration,
    policy: RetryPolicy,
    cancel: CancelToken,
}

/// Read size for response bytes
const READ_CHUNK: usize = 1024;

impl CommandChannel {
    /// Channel to `addr` with default client settings
    pub fn new(addr: SocketAddr) -> Self {
        Self::from_config(addr, &ClientConfig::default())
    }

    /// Channel to `addr` using timeouts and retry policy from `config`
    pub fn from_config(addr: SocketAddr, config: &ClientConfig) -> Self {
        Self {
            addr,
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            policy: config.retry_policy(),
            cancel: CancelToken::new(),
        }
    }

    /// Set the per-attempt response ceiling
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share an existing cancel token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Send `cmd` and wait for its response, retrying on timeout
    pub fn send(&self, cmd: &Command) -> Result<Response> {
        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::Config(format!(
                "Channel to {} needs non-zero timeouts (response {:?}, connect {:?})",
                self.addr, self.timeout, self.connect_timeout
            )));
        }
        let payload = wire::encode_command(cmd)?;
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                log::debug!("'{}' to {} cancelled", cmd.name(), self.addr);
                return Err(Error::Cancelled);
            }

            let mut attempt_timeout = self.timeout;
            if let Some(deadline) = self.policy.deadline {
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(Error::Timeout { attempts });
                }
                attempt_timeout = attempt_timeout.min(remaining);
            }

            attempts += 1;
            log::trace!("Sending '{}' to {} (attempt {})", cmd.name(), self.addr, attempts);

            match self.attempt(cmd, &payload, attempt_timeout)? {
                Some(response) => {
                    log::debug!(
                        "'{}' -> {:?} after {} attempt(s)",
                        cmd.name(),
                        response,
                        attempts
                    );
                    return Ok(response);
                }
                None if self.policy.allows_another(attempts) => {
                    log::warn!(
                        "No response to '{}' from {} within {:?}, resending (attempt {})",
                        cmd.name(),
                        self.addr,
                        attempt_timeout,
                        attempts + 1
                    );
                }
                None => {
                    log::warn!(
                        "Giving up on '{}' to {} after {} attempt(s)",
                        cmd.name(),
                        self.addr,
                        attempts
                    );
                    return Err(Error::Timeout { attempts });
                }
            }
        }
    }

    /// One full exchange on a fresh connection
    ///
    /// Returns `Ok(None)` when no complete response arrived within `timeout`.
    fn attempt(&self, cmd: &Command, payload: &[u8], timeout: Duration) -> Result<Option<Response>> {
        let mut stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout).map_err(
            |source| Error::Connection {
                addr: self.addr,
                source,
            },
        )?;
        let deadline = Instant::now() + timeout;

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Failed to set TCP_NODELAY: {}", e);
        }
        stream.set_write_timeout(Some(timeout))?;
        match stream.write_all(payload) {
            Ok(()) => {}
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        }

        let mut response = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            stream.set_read_timeout(Some(remaining))?;

            match stream.read(&mut chunk) {
                Ok(0) => {
                    return match wire::decode_response(cmd, &response)? {
                        Some(r) => Ok(Some(r)),
                        None if response.is_empty() => Err(Error::Protocol(format!(
                            "{} closed the connection without answering '{}'",
                            self.addr,
                            cmd.name()
                        ))),
                        None => Err(Error::Protocol(format!(
                            "Truncated response to '{}' ({} bytes)",
                            cmd.name(),
                            response.len()
                        ))),
                    };
                }
                Ok(n) => {
                    response.extend_from_slice(&chunk[..n]);
                    if response.len() > wire::MAX_RESPONSE_SIZE {
                        return Err(Error::Protocol(format!(
                            "Response to '{}' exceeds {} bytes",
                            cmd.name(),
                            wire::MAX_RESPONSE_SIZE
                        )));
                    }
                    if let Some(r) = wire::decode_response(cmd, &response)? {
                        return Ok(Some(r));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
