//! One-shot discovery of a bike by service identifier and advertised
//! name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::details::BikeDetails;
use crate::error::{BikeError, Result};

/// Scans for a single bike and resolves its persistent peripheral
/// identifier
///
/// Only one scan may be in flight per scanner instance; a second call
/// while one is active fails immediately with [`BikeError::Busy`].
pub struct BikeScanner {
    adapter: Adapter,
    scanning: AtomicBool,
}

impl BikeScanner {
    /// Create a scanner on the first available bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Unsupported`] if the machine has no bluetooth
    /// adapter, or [`BikeError::Ble`] if the stack cannot be initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BikeError::Unsupported)?;
        Ok(Self {
            adapter,
            scanning: AtomicBool::new(false),
        })
    }

    /// Scan for the peripheral matching a bike record.
    ///
    /// Filters on the profile's service identifier and the name the bike
    /// derives from its MAC address.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::BikeNotSupported`] for unported hardware
    /// generations, otherwise the same errors as [`find`](Self::find).
    pub async fn find_bike(
        &self,
        details: &BikeDetails,
        timeout: Duration,
    ) -> Result<PeripheralId> {
        let profile = details.profile().ok_or(BikeError::BikeNotSupported)?;
        self.find(profile.service(), Some(&details.device_name()), timeout)
            .await
    }

    /// Scan for the first peripheral advertising `service`, optionally
    /// requiring an advertised name.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Busy`] if a scan is already in flight,
    /// [`BikeError::Timeout`] if nothing matches in time,
    /// [`BikeError::PoweredOff`] if the adapter switches off mid-scan, or
    /// [`BikeError::Ble`] for stack failures.
    pub async fn find(
        &self,
        service: Uuid,
        name: Option<&str>,
        timeout: Duration,
    ) -> Result<PeripheralId> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            return Err(BikeError::Busy);
        }

        info!("scanning for service {service}, name {name:?}");
        let result = tokio::time::timeout(timeout, self.scan_for(service, name)).await;
        let _ = self.adapter.stop_scan().await;
        self.scanning.store(false, Ordering::SeqCst);

        match result {
            Ok(found) => found,
            Err(_) => Err(BikeError::Timeout),
        }
    }

    async fn scan_for(&self, service: Uuid, name: Option<&str>) -> Result<PeripheralId> {
        let mut events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;

        while let Some(event) = events.next().await {
            match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                    let peripheral = self.adapter.peripheral(&id).await?;
                    let local_name = peripheral
                        .properties()
                        .await?
                        .and_then(|properties| properties.local_name);
                    debug!("discovered {id:?} ({local_name:?})");
                    if name.is_none() || local_name.as_deref() == name {
                        return Ok(id);
                    }
                }
                CentralEvent::StateUpdate(CentralState::PoweredOff) => {
                    return Err(BikeError::PoweredOff);
                }
                _ => {}
            }
        }

        Err(BikeError::PeripheralNotFound)
    }
}
