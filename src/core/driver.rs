//! Collaborator traits for the server role
//!
//! The protocol layer never touches hardware. Command effects go through an
//! [`ActuationDriver`] and imagery comes from a [`FrameSource`].

use crate::core::types::{Command, Telemetry};
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Driver handle shared by the accept loop and the telemetry push
pub type SharedDriver = Arc<Mutex<Box<dyn ActuationDriver>>>;

/// Vehicle and actuator control
pub trait ActuationDriver: Send {
    /// Current telemetry snapshot
    fn telemetry(&mut self) -> Result<Telemetry>;

    /// Execute an action command
    ///
    /// Returns `Ok(false)` when the vehicle declines (e.g. takeoff while
    /// disarmed). `Err` is reserved for faults talking to the hardware; the
    /// server reports both as the failure literal.
    fn execute(&mut self, cmd: &Command) -> Result<bool>;
}

/// Produces encoded frames (e.g. JPEG images) for the push channel
pub trait FrameSource: Send {
    /// Capture one frame and return its encoded bytes
    fn capture(&mut self) -> Result<Vec<u8>>;
}
