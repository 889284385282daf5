//! Configuration for vahana-link
//!
//! Loads configuration from a TOML file. Every key has a default, so an empty
//! file (or [`Config::default`]) gives a working localhost setup.
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0:6969"
//! photo_port = 6970
//! telemetry_port = 6971
//!
//! [client]
//! timeout_ms = 2000
//! max_attempts = 5
//!
//! [transport]
//! max_chunk = 65472
//! strict_countdown = false
//!
//! [broadcast]
//! capture_interval_ms = 200
//! telemetry_interval_ms = 100
//!
//! [device]
//! camera_width = 640
//! camera_height = 480
//! jpeg_quality = 80
//! shot_hold_ms = 1000
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use crate::streaming::channel::RetryPolicy;
use crate::streaming::fragment::{DEFAULT_MAX_CHUNK, LossPolicy, MAX_DATAGRAM_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-side sockets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for the control channel
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Well-known UDP port subscribers receive photos on
    #[serde(default = "default_photo_port")]
    pub photo_port: u16,

    /// Well-known UDP port subscribers receive telemetry on
    #[serde(default = "default_telemetry_port")]
    pub telemetry_port: u16,

    /// Read timeout while waiting for a request on an accepted connection
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Control-channel client behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Per-attempt response ceiling
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect timeout (a failed connect is fatal, never retried)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum exchanges per command; 0 retries without limit
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Total time budget per command; 0 disables the deadline
    #[serde(default)]
    pub deadline_ms: u64,
}

/// Fragmentation transport parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum body bytes per datagram (header excluded)
    #[serde(default = "default_max_chunk")]
    pub max_chunk: usize,

    /// Discard frames whose countdown skips a value instead of decoding them
    #[serde(default)]
    pub strict_countdown: bool,
}

/// Server push loops
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BroadcastConfig {
    /// Period of the capture/broadcast loop
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,

    /// Period of the telemetry push loop
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
}

/// Simulated vehicle and camera used by the daemon
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default = "default_camera_width")]
    pub camera_width: u32,

    #[serde(default = "default_camera_height")]
    pub camera_height: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// How long the shot servo holds a position before returning to neutral
    #[serde(default = "default_shot_hold_ms")]
    pub shot_hold_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error); RUST_LOG wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:6969".to_string()
}

fn default_photo_port() -> u16 {
    6970
}

fn default_telemetry_port() -> u16 {
    6971
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_max_chunk() -> usize {
    DEFAULT_MAX_CHUNK
}

fn default_capture_interval_ms() -> u64 {
    200
}

fn default_telemetry_interval_ms() -> u64 {
    100
}

fn default_camera_width() -> u32 {
    640
}

fn default_camera_height() -> u32 {
    480
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_shot_hold_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            photo_port: default_photo_port(),
            telemetry_port: default_telemetry_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_attempts: default_max_attempts(),
            deadline_ms: 0,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_chunk: default_max_chunk(),
            strict_countdown: false,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms: default_capture_interval_ms(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            camera_width: default_camera_width(),
            camera_height: default_camera_height(),
            jpeg_quality: default_jpeg_quality(),
            shot_hold_ms: default_shot_hold_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use vahana_link::config::Config;
    ///
    /// let config = Config::load("vahana.toml")?;
    /// # Ok::<(), vahana_link::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the protocol cannot work with
    pub fn validate(&self) -> Result<()> {
        let max_chunk = self.transport.max_chunk;
        if max_chunk == 0 || max_chunk > MAX_DATAGRAM_PAYLOAD - 1 {
            return Err(Error::Config(format!(
                "transport.max_chunk must be in 1..={}, got {}",
                MAX_DATAGRAM_PAYLOAD - 1,
                max_chunk
            )));
        }
        let non_zero = [
            ("client.timeout_ms", self.client.timeout_ms),
            ("client.connect_timeout_ms", self.client.connect_timeout_ms),
            ("broadcast.capture_interval_ms", self.broadcast.capture_interval_ms),
            ("broadcast.telemetry_interval_ms", self.broadcast.telemetry_interval_ms),
        ];
        if let Some((key, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be non-zero", key)));
        }
        if self.network.request_timeout_ms == 0 {
            return Err(Error::Config(
                "network.request_timeout_ms must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.device.jpeg_quality) {
            return Err(Error::Config(format!(
                "device.jpeg_quality must be in 1..=100, got {}",
                self.device.jpeg_quality
            )));
        }
        if self.device.camera_width == 0 || self.device.camera_height == 0 {
            return Err(Error::Config("camera dimensions must be non-zero".into()));
        }
        if self.network.photo_port == self.network.telemetry_port {
            return Err(Error::Config(format!(
                "photo_port and telemetry_port must differ (both {})",
                self.network.photo_port
            )));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Per-attempt response ceiling
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Retry policy built from `max_attempts` and `deadline_ms`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
            deadline: (self.deadline_ms > 0).then(|| Duration::from_millis(self.deadline_ms)),
        }
    }
}

impl TransportConfig {
    /// Loss handling selected by `strict_countdown`
    pub fn loss_policy(&self) -> LossPolicy {
        if self.strict_countdown {
            LossPolicy::StrictCountdown
        } else {
            LossPolicy::Splice
        }
    }
}

impl NetworkConfig {
    /// Read timeout applied to accepted control connections
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl DeviceConfig {
    pub fn shot_hold(&self) -> Duration {
        Duration::from_millis(self.shot_hold_ms)
    }
}

impl BroadcastConfig {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }
}
