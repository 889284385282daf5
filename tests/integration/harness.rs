//! Test server fixture

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use vahana_link::devices::{create_camera, create_vehicle};
use vahana_link::streaming::RetryPolicy;
use vahana_link::{Client, Config, Server, ServerHandle};

/// Harness configuration.
#[derive(Clone)]
pub struct HarnessConfig {
    /// Capture loop period
    pub capture_interval: Duration,
    /// Telemetry push period
    pub telemetry_interval: Duration,
    /// Photo push port (0 = pick a free one)
    pub photo_port: u16,
    /// Telemetry push port (0 = pick a free one)
    pub telemetry_port: u16,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            // Long enough that only explicit requests produce frames
            capture_interval: Duration::from_secs(30),
            telemetry_interval: Duration::from_millis(20),
            photo_port: 0,
            telemetry_port: 0,
        }
    }
}

/// Running server plus the config it was started with
pub struct TestServer {
    pub handle: ServerHandle,
    pub config: Config,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(HarnessConfig::default())
    }

    pub fn start_with(harness: HarnessConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut config = Config::default();
        config.network.bind_address = "127.0.0.1:0".to_string();
        config.network.request_timeout_ms = 500;
        config.network.photo_port = or_free_port(harness.photo_port);
        config.network.telemetry_port = or_free_port(harness.telemetry_port);
        while config.network.telemetry_port == config.network.photo_port {
            config.network.telemetry_port = free_udp_port();
        }
        config.broadcast.capture_interval_ms = harness.capture_interval.as_millis() as u64;
        config.broadcast.telemetry_interval_ms = harness.telemetry_interval.as_millis() as u64;
        config.client.timeout_ms = 2000;
        config.device.camera_width = 64;
        config.device.camera_height = 48;
        config.device.shot_hold_ms = 0;
        config.validate().unwrap();

        let server = Server::new(config.clone(), create_vehicle(&config), create_camera(&config));
        let handle = server.start().unwrap();
        Self { handle, config }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.control_addr()
    }

    /// Client configured for this server's ports
    pub fn client(&self) -> Client {
        Client::from_config(self.addr(), &self.config).with_retry_policy(RetryPolicy::attempts(2))
    }
}

/// A UDP port that was free a moment ago
pub fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn or_free_port(port: u16) -> u16 {
    if port == 0 { free_udp_port() } else { port }
}
