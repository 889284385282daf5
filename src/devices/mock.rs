//! Simulated vehicle for hardware-free operation
//!
//! [`MockVehicle`] keeps just enough flight state to accept or decline
//! commands the way an autopilot would:
//!
//! | Command | Accepted when |
//! |---------|---------------|
//! | `takeoff` | armed and on the ground, `alt > 0` |
//! | `arm_takeoff` | on the ground, `alt > 0` (arms first) |
//! | `goto`, `hold`, `rtl`, `land`, `offboard_start` | in the air |
//! | `offboard_stop`, `offboard_cmd` | offboard mode active |
//! | `actuator` | `index` in `1..=ACTUATOR_COUNT`, `value` in `-1.0..=1.0` |
//! | `shot_*` | always |
//!
//! Movement is instantaneous: `goto` teleports, `land`/`rtl` touch down
//! and disarm immediately.
//!
//! # Shot Servo
//!
//! Shot commands drive a single servo. Every position change is appended to
//! a [`ServoLog`]. Left, right, parch and macz hold their angle for
//! `shot_hold`, then return to neutral, blocking the caller meanwhile.

use crate::core::driver::ActuationDriver;
use crate::core::types::{Battery, Command, Position, Status, Telemetry};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Number of generic actuator outputs
pub const ACTUATOR_COUNT: i32 = 8;

/// Servo angles in degrees
pub const SHOT_NEUTRAL_DEG: f32 = 0.0;
pub const SHOT_LEFT_DEG: f32 = 40.0;
pub const SHOT_RIGHT_DEG: f32 = 80.0;
pub const SHOT_PARCH_DEG: f32 = 120.0;
pub const SHOT_MACZ_DEG: f32 = 160.0;

/// Shared record of servo angles, in the order they were commanded
pub type ServoLog = Arc<Mutex<Vec<f32>>>;

/// Servo PWM duty cycle (percent, 50 Hz) for an angle
pub fn servo_duty(angle_deg: f32) -> f32 {
    angle_deg / 18.0 + 2.0
}

/// Home position of the simulated vehicle
pub const DEFAULT_HOME: Position = Position {
    lat: 47.397_742,
    lon: 8.545_594,
    alt_abs: 488.0,
    alt_rel: 0.0,
};

/// Simulated autopilot + shot servo
pub struct MockVehicle {
    home: Position,
    position: Position,
    yaw: f32,
    armed: bool,
    in_air: bool,
    offboard: bool,
    /// Last offboard setpoint (local NED, meters)
    setpoint: [f32; 3],
    actuators: [f32; ACTUATOR_COUNT as usize],
    battery: Battery,
    servo: ServoLog,
    shot_hold: Duration,
}

impl MockVehicle {
    pub fn new(home: Position, shot_hold: Duration) -> Self {
        Self {
            home,
            position: home,
            yaw: 0.0,
            armed: false,
            in_air: false,
            offboard: false,
            setpoint: [0.0; 3],
            actuators: [0.0; ACTUATOR_COUNT as usize],
            battery: Battery {
                percent: 1.0,
                voltage: 12.6,
            },
            servo: Arc::new(Mutex::new(Vec::new())),
            shot_hold,
        }
    }

    /// Handle to the servo position history
    pub fn servo_log(&self) -> ServoLog {
        Arc::clone(&self.servo)
    }

    /// Current output of actuator `index` (1-based)
    pub fn actuator(&self, index: i32) -> Option<f32> {
        index
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.actuators.get(i).copied())
    }

    fn set_servo(&self, angle: f32) {
        log::debug!("Shot servo -> {}° (duty {:.2}%)", angle, servo_duty(angle));
        self.servo.lock().push(angle);
    }

    fn shot(&self, angle: f32) -> bool {
        self.set_servo(angle);
        if !self.shot_hold.is_zero() {
            thread::sleep(self.shot_hold);
        }
        self.set_servo(SHOT_NEUTRAL_DEG);
        true
    }

    fn climb_to(&mut self, alt: f32) -> bool {
        if alt <= 0.0 || self.in_air || !self.armed {
            return false;
        }
        self.in_air = true;
        self.set_altitude(alt);
        self.battery.percent = (self.battery.percent - 0.01).max(0.0);
        true
    }

    fn set_altitude(&mut self, alt_rel: f32) {
        self.position.alt_rel = alt_rel;
        self.position.alt_abs = self.home.alt_abs + alt_rel;
    }

    fn touch_down(&mut self) {
        self.set_altitude(0.0);
        self.in_air = false;
        self.offboard = false;
        self.armed = false;
    }
}

impl Default for MockVehicle {
    fn default() -> Self {
        Self::new(DEFAULT_HOME, Duration::from_secs(1))
    }
}

impl ActuationDriver for MockVehicle {
    fn telemetry(&mut self) -> Result<Telemetry> {
        let mut telemetry = Telemetry {
            position: self.position,
            battery: self.battery,
            misc: Status {
                health: true,
                armed: self.armed,
                in_air: self.in_air,
            },
            ..Telemetry::default()
        };
        telemetry.angles.yaw = self.yaw;
        Ok(telemetry)
    }

    fn execute(&mut self, cmd: &Command) -> Result<bool> {
        let accepted = match *cmd {
            Command::Takeoff { alt } => self.climb_to(alt),
            Command::ArmTakeoff { alt } => {
                if self.in_air || alt <= 0.0 {
                    false
                } else {
                    self.armed = true;
                    self.climb_to(alt)
                }
            }
            Command::Goto {
                lat,
                lon,
                alt,
                heading,
            } => {
                if self.in_air {
                    self.position.lat = lat;
                    self.position.lon = lon;
                    self.set_altitude(alt);
                    self.yaw = heading;
                }
                self.in_air
            }
            Command::Rtl => {
                if self.in_air {
                    self.position.lat = self.home.lat;
                    self.position.lon = self.home.lon;
                    self.touch_down();
                    true
                } else {
                    false
                }
            }
            Command::Land => {
                let was_flying = self.in_air;
                if was_flying {
                    self.touch_down();
                }
                was_flying
            }
            Command::Hold => self.in_air,
            Command::OffboardStart => {
                self.offboard = self.in_air;
                self.in_air
            }
            Command::OffboardStop => std::mem::replace(&mut self.offboard, false),
            Command::OffboardCmd { x, y, z } => {
                if self.offboard {
                    self.setpoint = [x, y, z];
                    self.set_altitude(-z);
                }
                self.offboard
            }
            Command::Actuator { index, value } => {
                if !(1..=ACTUATOR_COUNT).contains(&index) || !(-1.0..=1.0).contains(&value) {
                    false
                } else {
                    self.actuators[(index - 1) as usize] = value;
                    true
                }
            }
            Command::ShotLeft => self.shot(SHOT_LEFT_DEG),
            Command::ShotRight => self.shot(SHOT_RIGHT_DEG),
            Command::ShotParch => self.shot(SHOT_PARCH_DEG),
            Command::ShotMacz => self.shot(SHOT_MACZ_DEG),
            Command::ShotNeutral => {
                self.set_servo(SHOT_NEUTRAL_DEG);
                true
            }
            Command::Get | Command::AddUdp | Command::SubPhoto | Command::SendPhoto => {
                return Err(Error::InvalidParameter(format!(
                    "'{}' is not a vehicle action",
                    cmd.name()
                )));
            }
        };

        log::info!(
            "{} '{}' (armed={}, in_air={}, offboard={})",
            if accepted { "Executed" } else { "Declined" },
            cmd.name(),
            self.armed,
            self.in_air,
            self.offboard
        );
        Ok(accepted)
    }
}
