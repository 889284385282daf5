//! Control channel and push transport
//!
//! - [`channel`]: client side of the request/response exchange
//! - [`tcp_receiver`]: server side of the same exchange
//! - [`wire`]: byte format shared by both sides
//! - [`fragment`], [`udp_publisher`], [`udp_receiver`]: countdown-fragmented
//!   push delivery
//! - [`registry`]: push destinations

pub mod channel;
pub mod fragment;
pub mod registry;
pub mod tcp_receiver;
pub mod udp_publisher;
pub mod udp_receiver;
pub mod wire;

pub use channel::{CancelToken, CommandChannel, RetryPolicy};
pub use fragment::{LossPolicy, Reassembler};
pub use registry::{SharedRegistry, SubscriberRegistry};
pub use tcp_receiver::{CommandHandler, CommandServer};
pub use udp_publisher::{CaptureBroadcaster, FramePublisher, FrameReport, TelemetryBroadcaster};
pub use udp_receiver::{FrameDecoder, FrameReceiver, ImageDecoder, RawDecoder, TelemetryDecoder};
