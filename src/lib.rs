#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Moofers 🚲
//!
//! A Rust library for controlling VanMoof smart bikes via Bluetooth Low
//! Energy.
//!
//! After VanMoof's bankruptcy the official app is the only way to unlock
//! the older bike generations, and it needs the vendor's servers. This
//! library talks to the bikes directly: it discovers a bike over BLE,
//! authenticates with its encryption key, reads and monitors the full
//! module state and issues every command the smart module understands.
//!
//! ## Protocol
//!
//! The wire protocol was reverse-engineered from the official apps:
//!
//! - **Profiles**: each hardware generation (SmartBike 2016, Smart S/X
//!   2018, the Electrified line) exposes its own GATT layout and bit-level
//!   encodings; all of it is tabulated in [`BikeProfile`].
//! - **Challenge-response writes**: every write first reads a fresh
//!   two-byte challenge that is bound into the encrypted frame, so stale
//!   commands cannot be replayed.
//! - **Encryption**: AES-128-ECB with zero padding, keyed with the
//!   per-bike key from the vendor's credential service.
//! - **State**: lock, alarm, lighting, battery, module state, motor
//!   assistance, speed, distance, region, unit, muted sounds and fault
//!   codes, decoded from fixed-size frames and republished as typed
//!   events.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use moofers::{Bike, BikeDetails, Lock, ProfileName};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from the vendor's web service or local storage.
//!     let details = BikeDetails::new(
//!         "My Bike",
//!         "ASY1234567",
//!         ProfileName::Electrified2018,
//!         "S2",
//!         "f8:8a:5e:12:34:56",
//!         "00112233445566778899aabbccddeeff",
//!         None,
//!     )?;
//!
//!     // Find the bike, connect and authenticate.
//!     let bike = Bike::discover(details, Duration::from_secs(30)).await?;
//!     bike.connect().await?;
//!
//!     // Unlock it.
//!     bike.set_lock(Lock::Unlocked).await?;
//!
//!     bike.disconnect().await;
//!     Ok(())
//! }
//! ```

/// The session aggregate: connect, authenticate, command, monitor
pub mod bike;
/// btleplug-backed transport implementation
pub mod ble;
/// AES-128-ECB zero padding primitives
pub mod cipher;
/// The durable per-bike record and its validation
pub mod details;
/// Error types and handling
pub mod error;
/// Typed session events
pub mod events;
/// Hex string conversions
pub mod hexstring;
/// Connection state machine and the single in-flight read/write slot
pub mod manager;
/// Hardware generation tables and binary codecs
pub mod profiles;
/// One-shot peripheral discovery
pub mod scan;
/// The transport capability boundary
pub mod transport;
/// Logical state types shared across generations
pub mod types;

// Re-export the main types for convenient usage
pub use bike::Bike;
pub use details::BikeDetails;
pub use error::{BikeError, Result};
pub use events::{BikeEvent, EventReceiver, StateChange};
pub use manager::{ConnectionManager, ConnectionState};
pub use profiles::{BikeProfile, Hardware, ProfileName, ReadRequest, WriteRequest};
pub use scan::BikeScanner;
pub use transport::{Transport, TransportEvent};
pub use types::{
    Alarm, BatteryState, BikeState, ErrorCode, Lighting, Lock, ModuleState, MotorAssistance,
    MutedSounds, Parameters, Region, Sound, Unit,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
