#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # treadctl
//!
//! A command-line and REPL client for controlling fitness machines that
//! implement the FTMS (Fitness Machine Service) Bluetooth Low Energy GATT
//! profile - walking pads and treadmills in particular.
//!
//! The crate translates a small set of human commands (start, stop, pause,
//! resume, set speed, query status) into FTMS control-point writes and
//! renders the machine's telemetry notifications back as tables. BLE
//! scanning, connections, and GATT plumbing are delegated to `btleplug`;
//! this crate carries only the thin FTMS codec (opcodes, flags, response
//! pairing) on top.
//!
//! Connecting remembers the machine: the address of the last successful
//! connection is cached in a JSON file and tried first - with a short
//! timeout - before falling back to a discovery scan.
//!
//! ## Quick Start
//!
//! ```no_run
//! use treadctl::{AddressCache, ConnectionParams, FtmsDevice};
//!
//! #[tokio::main]
//! async fn main() -> treadctl::Result<()> {
//!     let cache = AddressCache::open_default()?;
//!     let device = FtmsDevice::connect(&cache, ConnectionParams::default()).await?;
//!
//!     device.start_resume().await?;
//!     device.set_speed(3.5).await?;
//!
//!     let status = device.status().await;
//!     println!("{} at {:.1} km/h", status.state, status.speed_kmh);
//!
//!     device.pause().await?;
//!     device.disconnect().await?;
//!     Ok(())
//! }
//! ```

/// Bluetooth Low Energy transport layer
pub mod ble;
/// Last-known device address cache
pub mod cache;
/// REPL command table
pub mod commands;
/// Device session and control operations
pub mod device;
/// Table rendering and value formatting
pub mod display;
/// Error types and handling
pub mod error;
/// FTMS characteristic UUIDs, opcodes, and payload codec
pub mod ftms;
/// Interactive shell
pub mod repl;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use cache::AddressCache;
pub use device::FtmsDevice;
pub use error::{Result, TreadctlError};
pub use types::{ConnectionParams, DeviceInfo, DeviceStatus, SpeedRange, TrainingState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
