//! vahana-link daemon
//!
//! Runs the server role against the simulated vehicle and camera:
//!
//! - **TCP (network.bind_address)**: command channel
//! - **UDP (network.photo_port)**: photo push to `sub_photo` subscribers
//! - **UDP (network.telemetry_port)**: telemetry push to `add_udp` subscribers

use std::env;
use std::path::Path;
use std::sync::atomic::Ordering;
use vahana_link::devices::{create_camera, create_vehicle};
use vahana_link::{Config, Error, Result, Server};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `vahana-link <path>` (positional)
/// - `vahana-link --config <path>` (flag-based)
/// - `vahana-link -c <path>` (short flag)
///
/// Returns `None` when no path is given.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

/// Default location, used only if it exists
const DEFAULT_CONFIG_PATH: &str = "/etc/vahana.toml";

fn load_config() -> Result<(Config, String)> {
    match parse_config_path() {
        Some(path) => Ok((Config::load(&path)?, path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok((
            Config::load(DEFAULT_CONFIG_PATH)?,
            DEFAULT_CONFIG_PATH.to_string(),
        )),
        None => Ok((Config::default(), "<defaults>".to_string())),
    }
}

fn main() -> Result<()> {
    let (config, source) = load_config()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("vahana-link v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", source);

    let server = Server::new(config.clone(), create_vehicle(&config), create_camera(&config));

    let running = server.running();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!(
        "Control on {}, photo push :{}, telemetry push :{}",
        config.network.bind_address,
        config.network.photo_port,
        config.network.telemetry_port
    );
    log::info!("vahana-link running. Press Ctrl-C to stop.");

    server.run()?;

    log::info!("vahana-link stopped");
    Ok(())
}
