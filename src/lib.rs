//! vahana-link: control and imagery link for a remote actuation unit
//!
//! ## Protocol Architecture
//!
//! - **TCP (port 6969)**: one JSON command per connection, answered with
//!   `success` / `failed` or a telemetry object
//! - **UDP (port 6970)**: JPEG frames pushed to `sub_photo` subscribers,
//!   split into countdown-numbered fragments
//! - **UDP (port 6971)**: telemetry JSON pushed to `add_udp` subscribers
//!
//! [`Client`] and [`Server`] are the two protocol roles. The building blocks
//! (command channel, fragmentation, registry) live in [`streaming`].

pub mod client;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod server;
pub mod streaming;

pub use client::Client;
pub use config::Config;
pub use crate::core::{ActuationDriver, Command, FrameSource, Response, Telemetry};
pub use error::{Error, ErrorKind, Result};
pub use server::{Server, ServerHandle};
