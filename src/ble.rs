//! btleplug-backed implementation of the transport boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BikeError, Result};
use crate::transport::{Transport, TransportEvent};

/// A [`Transport`] backed by the platform BLE stack
pub struct BleTransport {
    adapter: Adapter,
    id: PeripheralId,
    peripheral: Mutex<Option<Peripheral>>,
    characteristics: Mutex<HashMap<Uuid, Characteristic>>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<TransportEvent>,
}

impl BleTransport {
    /// Create a transport for the peripheral with the given identifier,
    /// on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Unsupported`] if the machine has no bluetooth
    /// adapter, or [`BikeError::Ble`] if the stack cannot be initialized.
    pub async fn new(id: PeripheralId) -> Result<Arc<Self>> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BikeError::Unsupported)?;
        Ok(Self::with_adapter(adapter, id))
    }

    /// Create a transport on a specific adapter
    #[must_use]
    pub fn with_adapter(adapter: Adapter, id: PeripheralId) -> Arc<Self> {
        Arc::new(Self {
            adapter,
            id,
            peripheral: Mutex::new(None),
            characteristics: Mutex::new(HashMap::new()),
            connected: Arc::new(AtomicBool::new(false)),
            events: broadcast::channel(64).0,
        })
    }

    async fn peripheral(&self) -> Result<Peripheral> {
        self.peripheral
            .lock()
            .await
            .clone()
            .ok_or(BikeError::Disconnected)
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .lock()
            .await
            .get(&uuid)
            .cloned()
            .ok_or(BikeError::CharacteristicNotFound(uuid))
    }

    /// Forward adapter-level connect/disconnect events for our peripheral.
    fn watch_link(&self, mut events: impl futures::Stream<Item = CentralEvent> + Send + Unpin + 'static) {
        let id = self.id.clone();
        let sender = self.events.clone();
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    CentralEvent::DeviceDisconnected(other) if other == id => {
                        debug!("peripheral {id:?} disconnected");
                        connected.store(false, Ordering::SeqCst);
                        let _ = sender.send(TransportEvent::Disconnected);
                        break;
                    }
                    _ => {}
                }
            }
        });
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&self) -> Result<()> {
        let peripheral = self
            .adapter
            .peripheral(&self.id)
            .await
            .map_err(|_| BikeError::PeripheralNotFound)?;

        let events = self.adapter.events().await?;
        peripheral.connect().await?;
        self.watch_link(events);

        *self.peripheral.lock().await = Some(peripheral);
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected);
        Ok(())
    }

    async fn discover_characteristics(&self) -> Result<()> {
        let peripheral = self.peripheral().await?;
        peripheral.discover_services().await?;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            for characteristic in service.characteristics {
                characteristics.insert(characteristic.uuid, characteristic);
            }
        }
        debug!("discovered {} characteristics", characteristics.len());
        *self.characteristics.lock().await = characteristics;

        // notification frames flow until the peripheral disconnects
        let mut notifications = peripheral.notifications().await?;
        let sender = self.events.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let _ = sender.send(TransportEvent::Notification {
                    characteristic: notification.uuid,
                    data: notification.value,
                });
            }
        });

        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let peripheral = self.peripheral().await?;
        let characteristic = self.characteristic(characteristic).await?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let peripheral = self.peripheral().await?;
        let characteristic = self.characteristic(characteristic).await?;
        peripheral
            .write(&characteristic, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let peripheral = self.peripheral().await?;
        let characteristic = self.characteristic(characteristic).await?;
        peripheral.subscribe(&characteristic).await?;
        Ok(())
    }

    async fn read_rssi(&self) -> Result<i16> {
        let peripheral = self.peripheral().await?;
        let rssi = peripheral
            .properties()
            .await?
            .and_then(|properties| properties.rssi);
        Ok(rssi.unwrap_or(0))
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        let peripheral = self.peripheral.lock().await.take();
        self.characteristics.lock().await.clear();
        if let Some(peripheral) = peripheral {
            if let Err(error) = peripheral.disconnect().await {
                warn!("disconnect failed: {error}");
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
