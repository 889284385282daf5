//! End-to-end tests for vahana-link over localhost sockets
//!
//! Each test starts its own server on ephemeral ports with the simulated
//! vehicle and camera.
//!
//! ```bash
//! RUST_LOG=debug cargo test --test integration -- --nocapture
//! ```

mod control;
mod harness;
mod push;
