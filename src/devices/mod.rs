//! Device implementations

pub mod camera;
pub mod mock;

use crate::config::Config;
use crate::core::driver::{ActuationDriver, FrameSource};
use camera::SyntheticCamera;
use mock::{DEFAULT_HOME, MockVehicle};

/// Create the vehicle driver described by the configuration
pub fn create_vehicle(config: &Config) -> Box<dyn ActuationDriver> {
    Box::new(MockVehicle::new(DEFAULT_HOME, config.device.shot_hold()))
}

/// Create the frame source described by the configuration
pub fn create_camera(config: &Config) -> Box<dyn FrameSource> {
    Box::new(SyntheticCamera::new(
        config.device.camera_width,
        config.device.camera_height,
        config.device.jpeg_quality,
    ))
}
