//! Client role: typed access to a remote actuation unit
//!
//! Every action method maps `Response::Failure` to [`Error::Declined`], so a
//! caller can tell "the vehicle said no" apart from transport faults through
//! [`Error::kind`].
//!
//! ```no_run
//! use vahana_link::Client;
//!
//! let client = Client::connect("192.168.4.1:6969".parse().unwrap());
//! client.arm_takeoff(15.0)?;
//! let telemetry = client.telemetry()?;
//! println!("alt: {:.1} m", telemetry.position.alt_rel);
//! # Ok::<(), vahana_link::Error>(())
//! ```

use crate::config::{ClientConfig, Config};
use crate::core::types::{Command, Response, Telemetry};
use crate::error::{Error, Result};
use crate::streaming::channel::{CancelToken, CommandChannel, RetryPolicy};
use crate::streaming::fragment::LossPolicy;
use crate::streaming::udp_receiver::{FrameDecoder, FrameReceiver, ImageDecoder};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Photo push port used when none is configured
pub const DEFAULT_PHOTO_PORT: u16 = 6970;

/// Telemetry push port used when none is configured
pub const DEFAULT_TELEMETRY_PORT: u16 = 6971;

/// Protocol endpoint, client role
///
/// Holds no shared mutable state; clone it to issue commands from several
/// threads.
#[derive(Debug, Clone)]
pub struct Client {
    channel: CommandChannel,
    photo_port: u16,
    telemetry_port: u16,
    loss_policy: LossPolicy,
}

impl Client {
    /// Client with default timeouts and retry policy
    pub fn connect(addr: SocketAddr) -> Self {
        Self::with_channel(CommandChannel::new(addr))
    }

    /// Client configured from the `[client]`, `[network]` and `[transport]`
    /// sections
    pub fn from_config(addr: SocketAddr, config: &Config) -> Self {
        Self {
            channel: CommandChannel::from_config(addr, &config.client),
            photo_port: config.network.photo_port,
            telemetry_port: config.network.telemetry_port,
            loss_policy: config.transport.loss_policy(),
        }
    }

    /// Client over an already configured channel
    pub fn with_channel(channel: CommandChannel) -> Self {
        Self {
            channel,
            photo_port: DEFAULT_PHOTO_PORT,
            telemetry_port: DEFAULT_TELEMETRY_PORT,
            loss_policy: LossPolicy::default(),
        }
    }

    pub fn with_client_config(self, config: &ClientConfig) -> Self {
        Self {
            channel: CommandChannel::from_config(self.channel.addr(), config)
                .with_cancel_token(self.channel.cancel_token().clone()),
            ..self
        }
    }

    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        Self {
            channel: self.channel.with_retry_policy(policy),
            ..self
        }
    }

    pub fn with_cancel_token(self, cancel: CancelToken) -> Self {
        Self {
            channel: self.channel.with_cancel_token(cancel),
            ..self
        }
    }

    /// Well-known ports the server pushes photos and telemetry to
    pub fn with_push_ports(self, photo_port: u16, telemetry_port: u16) -> Self {
        Self {
            photo_port,
            telemetry_port,
            ..self
        }
    }

    pub fn with_loss_policy(self, loss_policy: LossPolicy) -> Self {
        Self { loss_policy, ..self }
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    pub fn photo_port(&self) -> u16 {
        self.photo_port
    }

    pub fn telemetry_port(&self) -> u16 {
        self.telemetry_port
    }

    /// Raw exchange; failure comes back as `Response::Failure`
    pub fn send(&self, cmd: &Command) -> Result<Response> {
        self.channel.send(cmd)
    }

    fn action(&self, cmd: Command) -> Result<()> {
        match self.channel.send(&cmd)? {
            Response::Success => Ok(()),
            Response::Failure => Err(Error::Declined(cmd.name())),
            Response::Telemetry(_) => Err(Error::Protocol(format!(
                "Telemetry returned for action '{}'",
                cmd.name()
            ))),
        }
    }

    /// Query the current telemetry snapshot
    pub fn telemetry(&self) -> Result<Telemetry> {
        match self.channel.send(&Command::Get)? {
            Response::Telemetry(t) => Ok(*t),
            Response::Failure => Err(Error::Declined(Command::Get.name())),
            Response::Success => Err(Error::Protocol("Outcome literal returned for 'get'".into())),
        }
    }

    pub fn goto(&self, lat: f64, lon: f64, alt: f32, heading: f32) -> Result<()> {
        self.action(Command::Goto {
            lat,
            lon,
            alt,
            heading,
        })
    }

    /// Take off; the vehicle must already be armed
    pub fn takeoff(&self, alt: f32) -> Result<()> {
        self.action(Command::Takeoff { alt })
    }

    pub fn arm_takeoff(&self, alt: f32) -> Result<()> {
        self.action(Command::ArmTakeoff { alt })
    }

    pub fn rtl(&self) -> Result<()> {
        self.action(Command::Rtl)
    }

    pub fn land(&self) -> Result<()> {
        self.action(Command::Land)
    }

    pub fn hold(&self) -> Result<()> {
        self.action(Command::Hold)
    }

    pub fn offboard_start(&self) -> Result<()> {
        self.action(Command::OffboardStart)
    }

    pub fn offboard_stop(&self) -> Result<()> {
        self.action(Command::OffboardStop)
    }

    /// Offboard setpoint in the local NED frame (m)
    pub fn offboard_cmd(&self, x: f32, y: f32, z: f32) -> Result<()> {
        self.action(Command::OffboardCmd { x, y, z })
    }

    pub fn actuator(&self, index: i32, value: f32) -> Result<()> {
        self.action(Command::Actuator { index, value })
    }

    /// Subscribe to the telemetry push; `Declined` if already subscribed
    pub fn add_udp(&self) -> Result<()> {
        self.action(Command::AddUdp)
    }

    /// Subscribe to the photo push; `Declined` if already subscribed
    pub fn sub_photo(&self) -> Result<()> {
        self.action(Command::SubPhoto)
    }

    pub fn shot_left(&self) -> Result<()> {
        self.action(Command::ShotLeft)
    }

    pub fn shot_right(&self) -> Result<()> {
        self.action(Command::ShotRight)
    }

    pub fn shot_neutral(&self) -> Result<()> {
        self.action(Command::ShotNeutral)
    }

    pub fn shot_parch(&self) -> Result<()> {
        self.action(Command::ShotParch)
    }

    pub fn shot_macz(&self) -> Result<()> {
        self.action(Command::ShotMacz)
    }

    /// Request an immediate capture; the frame arrives on the photo port
    pub fn send_photo(&self) -> Result<()> {
        self.action(Command::SendPhoto)
    }

    /// Bind a receiver on a push port of this host
    pub fn push_receiver<D: FrameDecoder>(&self, port: u16, decoder: D) -> Result<FrameReceiver<D>> {
        FrameReceiver::bind((Ipv4Addr::UNSPECIFIED, port), decoder, self.loss_policy)
    }

    /// Request a capture and wait for the next decoded photo
    ///
    /// The receiver is bound before the request goes out, so it starts
    /// aligned. If a periodic broadcast to this host was already mid-frame,
    /// the spliced tail fails to decode and is skipped. `timeout` bounds each
    /// socket read.
    pub fn receive_photo(&self, timeout: Duration) -> Result<image::DynamicImage> {
        let mut receiver = self
            .push_receiver(self.photo_port, ImageDecoder)?
            .assume_aligned();
        receiver.set_read_timeout(Some(timeout))?;
        self.send_photo()?;
        receiver.receive_frame()
    }
}
