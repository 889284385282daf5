//! Core types and collaborator traits

pub mod driver;
pub mod types;

pub use driver::{ActuationDriver, FrameSource, SharedDriver};
pub use types::{Command, Response, Telemetry};
