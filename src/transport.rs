//! The capability boundary between the protocol core and the platform
//! BLE stack.
//!
//! The core never touches platform BLE APIs directly; everything it needs
//! from a peripheral link goes through [`Transport`]. The btleplug-backed
//! implementation lives in [`crate::ble`]; tests substitute a simulated
//! device.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// An asynchronous push from the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The link to the peripheral came up
    Connected,
    /// The link to the peripheral went down, expectedly or not
    Disconnected,
    /// A notification frame arrived for a subscribed characteristic
    Notification {
        /// The characteristic that pushed the frame
        characteristic: Uuid,
        /// The raw frame bytes
        data: Vec<u8>,
    },
}

/// One link to one peripheral
///
/// Implementations are expected to fail any in-flight `read` or `write`
/// with a disconnected error when the link drops, and to emit
/// [`TransportEvent::Disconnected`] exactly once per drop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link to the peripheral
    async fn connect(&self) -> Result<()>;

    /// Discover all services and characteristics
    ///
    /// Must complete before any read, write or subscription.
    async fn discover_characteristics(&self) -> Result<()>;

    /// Read the current value of a characteristic
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a value to a characteristic
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Enable notifications for a characteristic
    ///
    /// Frames arrive as [`TransportEvent::Notification`] on [`Transport::events`].
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Read the received signal strength in dBm
    async fn read_rssi(&self) -> Result<i16>;

    /// Close the link to the peripheral
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up
    fn is_connected(&self) -> bool;

    /// Subscribe to transport events
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
