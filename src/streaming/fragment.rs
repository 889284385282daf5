//! Countdown fragmentation for payloads larger than one datagram
//!
//! # Wire Format
//!
//! Every datagram carries a 1-byte countdown followed by a slice of the frame:
//!
//! ```text
//! ┌───────────────────┬──────────────────────────────┐
//! │ Countdown (1 byte)│ Body (0..=max_chunk bytes)   │
//! │ N, N-1, ..., 1    │ next slice of the payload    │
//! └───────────────────┴──────────────────────────────┘
//! ```
//!
//! A frame split into N fragments is sent with countdowns N, N-1, ..., 1. The
//! fragment with countdown 1 is always the last one of its frame, so a
//! receiver that joins mid-stream can align itself by waiting for it.
//!
//! There are no frame identifiers, sequence numbers or acknowledgements. A
//! lost fragment splices two partial frames together; with
//! [`LossPolicy::Splice`] the result is handed to the decoder, which will
//! usually (not always) reject it. [`LossPolicy::StrictCountdown`] drops a
//! frame as soon as the countdown skips a value. Neither policy can notice
//! the loss of a frame's first fragment, because N is never transmitted.

use crate::error::{Error, Result};

/// Bytes of countdown header in front of every body
pub const FRAGMENT_HEADER_LEN: usize = 1;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// Default body size: 64 KiB minus 64 bytes of headroom
pub const DEFAULT_MAX_CHUNK: usize = 65_472;

/// A 1-byte countdown cannot number more fragments than this
pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

/// One datagram's worth of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Fragments remaining in the frame, including this one
    pub countdown: u8,
    /// Slice of the frame payload
    pub body: &'a [u8],
}

impl<'a> Fragment<'a> {
    /// Parse a received datagram; `None` for a zero-length datagram
    pub fn parse(datagram: &'a [u8]) -> Option<Self> {
        let (&countdown, body) = datagram.split_first()?;
        Some(Self { countdown, body })
    }

    /// True for the final fragment of a frame
    ///
    /// Countdown 0 is never sent but is treated as terminal as well.
    pub fn is_last(&self) -> bool {
        self.countdown <= 1
    }

    /// Write header + body into `buf`, replacing its contents
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.reserve(FRAGMENT_HEADER_LEN + self.body.len());
        buf.push(self.countdown);
        buf.extend_from_slice(self.body);
    }
}

/// Number of datagrams needed for `len` payload bytes
///
/// An empty payload still occupies one (empty, terminal) fragment.
pub fn fragment_count(len: usize, max_chunk: usize) -> usize {
    if len == 0 { 1 } else { len.div_ceil(max_chunk) }
}

/// Split `payload` into fragments of at most `max_chunk` body bytes
///
/// Fails before producing anything if the frame would need more than
/// [`MAX_FRAGMENTS`] datagrams.
pub fn split(payload: &[u8], max_chunk: usize) -> Result<Vec<Fragment<'_>>> {
    if max_chunk == 0 {
        return Err(Error::InvalidParameter("max_chunk must be non-zero".into()));
    }

    let count = fragment_count(payload.len(), max_chunk);
    if count > MAX_FRAGMENTS {
        return Err(Error::FrameTooLarge {
            len: payload.len(),
            fragments: count,
        });
    }

    if payload.is_empty() {
        return Ok(vec![Fragment {
            countdown: 1,
            body: payload,
        }]);
    }

    // count <= 255, checked above
    Ok(payload
        .chunks(max_chunk)
        .zip((1..=count as u8).rev())
        .map(|(body, countdown)| Fragment { countdown, body })
        .collect())
}

/// How the reassembler treats a countdown that skips a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossPolicy {
    /// Keep accumulating; a lost fragment splices data from two frames
    #[default]
    Splice,
    /// Discard the frame on any countdown gap
    StrictCountdown,
}

/// Why a partial frame was thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Zero-length datagram in the middle of a frame
    Spurious,
    /// Countdown jumped (strict policy only)
    Gap { expected: u8, got: u8 },
}

/// Outcome of feeding one datagram to the [`Reassembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Frame not finished yet (or datagram skipped while resynchronizing)
    Pending,
    /// Terminal fragment arrived; the complete frame bytes
    Complete(Vec<u8>),
    /// Partial frame was dropped
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Not yet aligned; skipping datagrams until a terminal fragment passes
    WaitingBoundary,
    /// Aligned; `last` is the countdown of the previous fragment of this frame
    Accumulating { last: Option<u8> },
}

/// Receiver-side frame reassembly state machine
///
/// ```text
/// WaitingBoundary ──(countdown ≤ 1)──▶ Accumulating ──(countdown ≤ 1)──▶ Complete
///        ▲                                  │
///        └──(zero-length datagram, or ──────┘
///            strict countdown gap)
/// ```
#[derive(Debug)]
pub struct Reassembler {
    state: State,
    buffer: Vec<u8>,
    policy: LossPolicy,
}

impl Reassembler {
    /// New reassembler that must resynchronize before accepting data
    pub fn new(policy: LossPolicy) -> Self {
        Self {
            state: State::WaitingBoundary,
            buffer: Vec::new(),
            policy,
        }
    }

    /// New reassembler that treats the next datagram as the start of a frame
    ///
    /// Only correct when the caller knows no frame is in flight, e.g. the
    /// socket was bound before the sender started.
    pub fn aligned(policy: LossPolicy) -> Self {
        Self {
            state: State::Accumulating { last: None },
            buffer: Vec::new(),
            policy,
        }
    }

    /// True once a frame boundary has been observed
    pub fn is_aligned(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    pub fn policy(&self) -> LossPolicy {
        self.policy
    }

    /// Bytes accumulated for the frame in progress
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame and resynchronize
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingBoundary;
    }

    /// Feed one received datagram
    pub fn feed(&mut self, datagram: &[u8]) -> Feed {
        let Some(fragment) = Fragment::parse(datagram) else {
            return match self.state {
                State::Accumulating { last: Some(_) } => {
                    self.reset();
                    Feed::Discarded(DiscardReason::Spurious)
                }
                // Nothing accumulated yet, alignment is unaffected
                _ => Feed::Pending,
            };
        };

        match self.state {
            State::WaitingBoundary => {
                if fragment.is_last() {
                    log::debug!("Aligned to frame boundary");
                    self.state = State::Accumulating { last: None };
                }
                Feed::Pending
            }
            State::Accumulating { last } => {
                let mut outcome = Feed::Pending;

                if self.policy == LossPolicy::StrictCountdown
                    && let Some(prev) = last
                    && fragment.countdown != prev - 1
                {
                    let reason = DiscardReason::Gap {
                        expected: prev - 1,
                        got: fragment.countdown,
                    };
                    self.buffer.clear();

                    if fragment.countdown < prev {
                        // Middle of the same frame lost: skip to its end
                        self.state = if fragment.is_last() {
                            State::Accumulating { last: None }
                        } else {
                            State::WaitingBoundary
                        };
                        return Feed::Discarded(reason);
                    }

                    // Countdown went up: the previous frame's tail was lost
                    // and this fragment opens the next frame.
                    outcome = Feed::Discarded(reason);
                }

                self.buffer.extend_from_slice(fragment.body);

                if fragment.is_last() {
                    self.state = State::Accumulating { last: None };
                    return Feed::Complete(std::mem::take(&mut self.buffer));
                }

                self.state = State::Accumulating {
                    last: Some(fragment.countdown),
                };
                outcome
            }
        }
    }
}
