//! Core data types for commands, responses, and telemetry.
//!
//! Key types:
//! - [`Command`]: One control-channel request. Serialized as a JSON object
//!   whose `command` field selects the kind.
//! - [`Response`]: Outcome of one exchange, either an action outcome or a
//!   [`Telemetry`] snapshot, never both.
//! - [`Telemetry`]: Vehicle state returned by `get`.

use serde::{Deserialize, Serialize};

/// Commands accepted by the actuation unit
///
/// Wire form example: `{"command":"goto","lat":47.39,"lon":8.54,"alt":10.0,"heading":0.0}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Query telemetry
    Get,

    /// Fly to a global position
    Goto {
        /// Latitude in degrees
        lat: f64,
        /// Longitude in degrees
        lon: f64,
        /// Altitude in meters (relative to home)
        alt: f32,
        /// Heading in degrees
        heading: f32,
    },

    /// Take off to the given altitude (vehicle must already be armed)
    Takeoff { alt: f32 },

    /// Arm, then take off to the given altitude
    ArmTakeoff { alt: f32 },

    /// Return to launch
    Rtl,
    Land,
    Hold,

    /// Enter offboard (externally commanded setpoint) mode
    OffboardStart,
    OffboardStop,

    /// Offboard setpoint, local NED frame in meters
    OffboardCmd { x: f32, y: f32, z: f32 },

    /// Set a generic actuator output
    Actuator {
        /// Actuator output index
        index: i32,
        /// Normalized output value
        value: f32,
    },

    /// Subscribe the requester to the telemetry push
    AddUdp,
    /// Subscribe the requester to the photo push
    SubPhoto,

    ShotLeft,
    ShotRight,
    ShotNeutral,
    ShotParch,
    ShotMacz,

    /// Ask for an immediate capture, delivered through the photo push
    SendPhoto,
}

impl Command {
    /// Wire name of this command kind
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Goto { .. } => "goto",
            Command::Takeoff { .. } => "takeoff",
            Command::ArmTakeoff { .. } => "arm_takeoff",
            Command::Rtl => "rtl",
            Command::Land => "land",
            Command::Hold => "hold",
            Command::OffboardStart => "offboard_start",
            Command::OffboardStop => "offboard_stop",
            Command::OffboardCmd { .. } => "offboard_cmd",
            Command::Actuator { .. } => "actuator",
            Command::AddUdp => "add_udp",
            Command::SubPhoto => "sub_photo",
            Command::ShotLeft => "shot_left",
            Command::ShotRight => "shot_right",
            Command::ShotNeutral => "shot_neutral",
            Command::ShotParch => "shot_parch",
            Command::ShotMacz => "shot_macz",
            Command::SendPhoto => "send_photo",
        }
    }

    /// True for query commands answered with a structured payload
    pub fn is_query(&self) -> bool {
        matches!(self, Command::Get)
    }
}

/// Result of one completed exchange
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Peer accepted the action
    Success,
    /// Peer explicitly declined the action
    Failure,
    /// Answer to a query command
    Telemetry(Box<Telemetry>),
}

impl Response {
    /// True only for [`Response::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success)
    }

    /// Action outcome as a response value
    pub fn from_outcome(accepted: bool) -> Self {
        if accepted {
            Response::Success
        } else {
            Response::Failure
        }
    }
}

/// Vehicle telemetry snapshot, as returned by `get`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    pub position: Position,
    pub velocity: Velocity,
    pub plane: PlaneMetrics,
    pub angles: Angles,
    pub battery: Battery,
    pub misc: Status,
}

/// Global position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Altitude above mean sea level (m)
    pub alt_abs: f32,
    /// Altitude above home (m)
    pub alt_rel: f32,
}

/// NED velocity (m/s)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Velocity {
    pub north: f32,
    pub east: f32,
    pub down: f32,
}

/// Fixed-wing metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneMetrics {
    pub airspeed: f32,
    pub climbrate: f32,
}

/// Euler angles (degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Angles {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Battery state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Battery {
    /// Remaining charge (0.0 - 1.0)
    pub percent: f32,
    pub voltage: f32,
}

/// Health and flight state flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub health: bool,
    pub armed: bool,
    #[serde(rename = "inAir")]
    pub in_air: bool,
}
