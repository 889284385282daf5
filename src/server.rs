//! Server role: control channel plus push loops
//!
//! ```text
//!                 ┌──────────────────┐  register   ┌──────────────────┐
//! TCP :6969 ────▶ │  command-server  │ ──────────▶ │ photo / telemetry│
//!                 │ (serial accept)  │             │    registries    │
//!                 └───────┬──────────┘             └────┬────────┬────┘
//!                         │ send_photo queue            │snapshot│
//!                         ▼                             ▼        ▼
//!                 ┌──────────────────┐        ┌──────────────────────┐
//!                 │capture-broadcast │        │ telemetry-broadcast  │
//!                 └───────┬──────────┘        └──────────┬───────────┘
//!                         ▼ UDP :6970                    ▼ UDP :6971
//! ```
//!
//! All threads observe one running flag. [`Server::run`] blocks on the accept
//! loop; [`Server::start`] runs everything in the background and returns a
//! [`ServerHandle`].

use crate::config::Config;
use crate::core::driver::{ActuationDriver, FrameSource, SharedDriver};
use crate::error::{Error, Result};
use crate::streaming::registry::{SharedRegistry, SubscriberRegistry};
use crate::streaming::tcp_receiver::{CommandHandler, CommandServer};
use crate::streaming::udp_publisher::{CaptureBroadcaster, FramePublisher, TelemetryBroadcaster};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Pending `send_photo` requests the capture loop may fall behind by
const PHOTO_REQUEST_QUEUE: usize = 8;

/// Protocol endpoint, server role
pub struct Server {
    config: Config,
    driver: SharedDriver,
    source: Box<dyn FrameSource>,
    photo_registry: SharedRegistry,
    telemetry_registry: SharedRegistry,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: Config, driver: Box<dyn ActuationDriver>, source: Box<dyn FrameSource>) -> Self {
        Self {
            config,
            driver: Arc::new(Mutex::new(driver)),
            source,
            photo_registry: SubscriberRegistry::shared(),
            telemetry_registry: SubscriberRegistry::shared(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag that stops every server thread when cleared
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn photo_registry(&self) -> SharedRegistry {
        Arc::clone(&self.photo_registry)
    }

    pub fn telemetry_registry(&self) -> SharedRegistry {
        Arc::clone(&self.telemetry_registry)
    }

    pub fn driver(&self) -> SharedDriver {
        Arc::clone(&self.driver)
    }

    /// Bind the control listener and spawn the push loops
    fn launch(self) -> Result<(CommandServer, Vec<JoinHandle<()>>)> {
        let network = &self.config.network;
        let max_chunk = self.config.transport.max_chunk;
        let (photo_tx, photo_rx) = crossbeam_channel::bounded(PHOTO_REQUEST_QUEUE);

        let handler = CommandHandler::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.photo_registry),
            Arc::clone(&self.telemetry_registry),
            photo_tx,
            network.photo_port,
            network.telemetry_port,
        );
        let server = CommandServer::bind(
            network.bind_address.as_str(),
            handler,
            network.request_timeout(),
            Arc::clone(&self.running),
        )
        .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", network.bind_address, e)))?;

        log::info!(
            "Push ports: photo {} / telemetry {} (max chunk {} bytes, {:?})",
            network.photo_port,
            network.telemetry_port,
            max_chunk,
            self.config.transport.loss_policy()
        );

        let mut threads = Vec::with_capacity(2);

        let mut capture = CaptureBroadcaster::new(
            FramePublisher::bind_ephemeral(max_chunk)?,
            self.source,
            Arc::clone(&self.photo_registry),
            photo_rx,
            Arc::clone(&self.running),
            self.config.broadcast.capture_interval(),
        );
        threads.push(
            thread::Builder::new()
                .name("capture-broadcast".to_string())
                .spawn(move || {
                    if let Err(e) = capture.run() {
                        log::error!("Capture broadcaster error: {}", e);
                    }
                })
                .map_err(|e| Error::Other(format!("Failed to spawn capture broadcaster: {}", e)))?,
        );

        let mut telemetry = TelemetryBroadcaster::new(
            FramePublisher::bind_ephemeral(max_chunk)?,
            Arc::clone(&self.driver),
            Arc::clone(&self.telemetry_registry),
            Arc::clone(&self.running),
            self.config.broadcast.telemetry_interval(),
        );
        threads.push(
            thread::Builder::new()
                .name("telemetry-broadcast".to_string())
                .spawn(move || {
                    if let Err(e) = telemetry.run() {
                        log::error!("Telemetry broadcaster error: {}", e);
                    }
                })
                .map_err(|e| Error::Other(format!("Failed to spawn telemetry broadcaster: {}", e)))?,
        );

        Ok((server, threads))
    }

    /// Serve on the calling thread until the running flag is cleared
    pub fn run(self) -> Result<()> {
        let running = self.running();
        let (mut server, threads) = self.launch()?;

        let result = server.run();
        running.store(false, Ordering::Relaxed);
        // Closes the photo request queue so the capture loop wakes up
        drop(server);
        join_all(threads);
        result
    }

    /// Serve on background threads
    pub fn start(self) -> Result<ServerHandle> {
        let running = self.running();
        let photo_registry = self.photo_registry();
        let telemetry_registry = self.telemetry_registry();
        let driver = self.driver();

        let (mut server, mut threads) = self.launch()?;
        let control_addr = server.local_addr()?;

        let spawned = thread::Builder::new()
            .name("command-server".to_string())
            .spawn(move || {
                if let Err(e) = server.run() {
                    log::error!("Command server error: {}", e);
                }
            });
        match spawned {
            Ok(handle) => threads.push(handle),
            Err(e) => {
                running.store(false, Ordering::Relaxed);
                join_all(threads);
                return Err(Error::Other(format!("Failed to spawn command server: {}", e)));
            }
        }

        Ok(ServerHandle {
            control_addr,
            running,
            photo_registry,
            telemetry_registry,
            driver,
            threads,
        })
    }
}

fn join_all(threads: Vec<JoinHandle<()>>) {
    for handle in threads {
        if handle.join().is_err() {
            log::error!("Server thread panicked");
        }
    }
}

/// Running server started with [`Server::start`]
pub struct ServerHandle {
    control_addr: SocketAddr,
    running: Arc<AtomicBool>,
    photo_registry: SharedRegistry,
    telemetry_registry: SharedRegistry,
    driver: SharedDriver,
    threads: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the control listener is bound to
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn photo_registry(&self) -> &SharedRegistry {
        &self.photo_registry
    }

    pub fn telemetry_registry(&self) -> &SharedRegistry {
        &self.telemetry_registry
    }

    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Clear the running flag and wait for every thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        join_all(std::mem::take(&mut self.threads));
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
