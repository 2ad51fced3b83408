// SPDX-License-Identifier: Apache-2.0

//! Device registry with idempotent announcement.
//!
//! Meters are discovered over and over while tailing reading files; the
//! registry makes sure each device identifier is announced to the gateway
//! once, and re-announces the full set on demand so a restarted gateway
//! relearns every known device.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::forwarder::error::{Error, Result};
use crate::gateway::{Device, Gateway};

pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    gateway: Arc<dyn Gateway>,
}

impl DeviceRegistry {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            gateway,
        }
    }

    /// Register a device and announce it to the gateway, unless the
    /// identifier is already known.
    ///
    /// The device is recorded before the announce call, so an announce
    /// failure leaves it registered; the periodic [`refresh`](Self::refresh)
    /// retries the announcement later. The gateway is never called with a
    /// lock held.
    pub async fn add_idempotent(&self, device: Device) -> Result<()> {
        {
            let devices = self
                .devices
                .read()
                .map_err(|e| Error::Gateway(format!("device map lock poisoned: {e}")))?;
            if devices.contains_key(&device.id) {
                return Ok(());
            }
        }

        {
            let mut devices = self
                .devices
                .write()
                .map_err(|e| Error::Gateway(format!("device map lock poisoned: {e}")))?;
            devices.insert(device.id.clone(), device.clone());
        }

        self.gateway
            .announce(&device)
            .await
            .map_err(|e| Error::Gateway(e.to_string()))
    }

    /// Re-announce every known device. Per-device failures are logged and
    /// the rest of the set is still announced.
    pub async fn refresh(&self) {
        let devices: Vec<Device> = match self.devices.read() {
            Ok(devices) => devices.values().cloned().collect(),
            Err(e) => {
                warn!(error = %e, "device map lock poisoned");
                return;
            }
        };

        for device in devices {
            if let Err(e) = self.gateway.announce(&device).await {
                warn!(device_id = %device.id, error = %e, "unable to re-announce device");
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.devices.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::RecordingGateway;

    #[tokio::test]
    async fn add_announces_once_per_identifier() {
        let gateway = Arc::new(RecordingGateway::default());
        let registry = DeviceRegistry::new(gateway.clone());

        let device = Device::new("M1", "Meter One", "");
        registry.add_idempotent(device.clone()).await.unwrap();
        registry.add_idempotent(device.clone()).await.unwrap();
        registry
            .add_idempotent(Device::new("M1", "Renamed", ""))
            .await
            .unwrap();

        assert_eq!(gateway.announced.lock().unwrap().len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_announce_leaves_device_registered() {
        let gateway = Arc::new(RecordingGateway {
            fail_announce: true,
            ..Default::default()
        });
        let registry = DeviceRegistry::new(gateway.clone());

        let err = registry
            .add_idempotent(Device::new("M1", "Meter One", ""))
            .await;
        assert!(err.is_err());
        assert_eq!(registry.len(), 1);

        // A later add for the same id does not retry the announce
        registry
            .add_idempotent(Device::new("M1", "Meter One", ""))
            .await
            .unwrap();
        assert_eq!(gateway.announced.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_reannounces_all_devices() {
        let gateway = Arc::new(RecordingGateway::default());
        let registry = DeviceRegistry::new(gateway.clone());

        registry
            .add_idempotent(Device::new("M1", "Meter One", ""))
            .await
            .unwrap();
        registry
            .add_idempotent(Device::new("M2", "Meter Two", ""))
            .await
            .unwrap();

        registry.refresh().await;

        let announced = gateway.announced.lock().unwrap();
        assert_eq!(announced.len(), 4);
        let mut refreshed: Vec<&str> = announced[2..].iter().map(|d| d.id.as_str()).collect();
        refreshed.sort();
        assert_eq!(refreshed, vec!["M1", "M2"]);
    }

    #[tokio::test]
    async fn refresh_on_empty_registry_is_a_noop() {
        let gateway = Arc::new(RecordingGateway::default());
        let registry = DeviceRegistry::new(gateway.clone());
        registry.refresh().await;
        assert!(gateway.announced.lock().unwrap().is_empty());
    }
}
