//! # Depthcast
//!
//! Live depth and colour frame broadcasting - captures frames from a depth
//! sensor and streams them to WebSocket subscribers as RGBA images.
//!
//! ## Features
//!
//! - **Topic subscriptions**: Clients send `SUBSCRIBE video` / `SUBSCRIBE depth`
//! - **One worker per stream**: Frames are transformed and encoded once, then
//!   fanned out to every subscriber
//! - **Versioned binary protocol**: Timestamped, self-describing messages
//! - **Pluggable devices**: Capture backends sit behind [`device::DeviceProxy`]
//!
//! ## Modules
//!
//! - [`device`]: Capture backend interface, frame queue and synthetic device
//! - [`protocol`]: Client commands and server messages
//! - [`publisher`]: Per-stream pixel transforms and publish step
//! - [`websocket`]: Connection hub, topic channels and upgrade handler
//! - [`server`]: Server lifecycle and HTTP routes
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use depthcast::config::ServerConfig;
//! use depthcast::device::{SyntheticConfig, SyntheticDevice};
//! use depthcast::server::BroadcastServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = SyntheticDevice::new(SyntheticConfig::default())?;
//!     let server = Arc::new(BroadcastServer::new(ServerConfig::default(), Arc::new(device)));
//!
//!     // Stop from anywhere with server.stop()
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod protocol;
pub mod publisher;
pub mod server;
pub mod websocket;

pub use config::Config;
pub use device::{DeviceProxy, StreamKind};
pub use server::{BroadcastServer, ServerError, ServerState};
