// SPDX-License-Identifier: Apache-2.0

//! Device gateway boundary.
//!
//! The forwarder only needs two operations from the gateway: register (or
//! re-register) a device by identifier, and publish a named event payload
//! attributed to a device. The actual transport lives behind the [`Gateway`]
//! trait; the crate ships a [`DebugGateway`] that logs everything it is
//! handed, for running the agent without a broker.

use async_trait::async_trait;
use tower::BoxError;
use tracing::info;

/// A device known to the gateway. The identifier is the natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Device-type identifier. Only fully known for the hub device; meters
    /// discovered from reading files carry an empty device type.
    pub device_type: String,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: device_type.into(),
        }
    }
}

/// Operations the ingestion pipeline requires from the gateway collaborator.
///
/// Both operations are single-attempt: callers log failures and continue,
/// they never retry here.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Register or update a device. Announcing an already-known device must
    /// be harmless on the gateway side.
    async fn announce(&self, device: &Device) -> Result<(), BoxError>;

    /// Publish an event payload for a device under the given service kind.
    async fn publish(&self, device_id: &str, service: &str, payload: &[u8])
    -> Result<(), BoxError>;
}

/// Service kind for completed telegrams from the shared log file.
pub const ENCRYPTED_SERVICE: &str = "encrypted";
/// Service kind for raw reading lines from per-meter files.
pub const DECRYPTED_SERVICE: &str = "decrypted";

/// Gateway that logs announcements and events instead of delivering them.
#[derive(Debug, Default)]
pub struct DebugGateway;

#[async_trait]
impl Gateway for DebugGateway {
    async fn announce(&self, device: &Device) -> Result<(), BoxError> {
        info!(
            device_id = %device.id,
            name = %device.name,
            device_type = %device.device_type,
            "announce device"
        );
        Ok(())
    }

    async fn publish(
        &self,
        device_id: &str,
        service: &str,
        payload: &[u8],
    ) -> Result<(), BoxError> {
        info!(
            device_id,
            service,
            payload_len = payload.len(),
            "publish event"
        );
        Ok(())
    }
}
