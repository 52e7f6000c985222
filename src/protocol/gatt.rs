//! Attribute protocol and service table interfaces.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::ble::uuids::{
    CHARACTERISTIC_APPEARANCE_UUID, CHARACTERISTIC_DEVICE_NAME_UUID,
    CHARACTERISTIC_SERVICE_CHANGED_UUID, SERVICE_GENERIC_ACCESS_UUID,
    SERVICE_GENERIC_ATTRIBUTE_UUID,
};
use crate::error::Result;
use crate::protocol::hci::TransportError;

/// Characteristic property flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharacteristicPermissions(u8);

impl CharacteristicPermissions {
    /// Broadcast permission.
    pub const BROADCAST: Self = Self(0x01);
    /// Read permission.
    pub const READ: Self = Self(0x02);
    /// Write without response permission.
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    /// Write permission.
    pub const WRITE: Self = Self(0x08);
    /// Notify permission.
    pub const NOTIFY: Self = Self(0x10);
    /// Indicate permission.
    pub const INDICATE: Self = Self(0x20);

    /// Raw property bits.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CharacteristicPermissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A characteristic to expose in a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicConfig {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Allowed operations.
    pub permissions: CharacteristicPermissions,
    /// Initial value.
    pub value: Vec<u8>,
}

/// A service descriptor handed to the [`ServiceTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics of the service.
    pub characteristics: Vec<CharacteristicConfig>,
}

/// Build the Generic Access and Generic Attribute services every GATT
/// server must expose.
pub fn generic_services(device_name: &[u8], appearance: u16) -> [Service; 2] {
    [
        Service {
            uuid: SERVICE_GENERIC_ACCESS_UUID,
            characteristics: vec![
                CharacteristicConfig {
                    uuid: CHARACTERISTIC_DEVICE_NAME_UUID,
                    permissions: CharacteristicPermissions::READ,
                    value: device_name.to_vec(),
                },
                CharacteristicConfig {
                    uuid: CHARACTERISTIC_APPEARANCE_UUID,
                    permissions: CharacteristicPermissions::READ,
                    value: appearance.to_le_bytes().to_vec(),
                },
            ],
        },
        Service {
            uuid: SERVICE_GENERIC_ATTRIBUTE_UUID,
            characteristics: vec![CharacteristicConfig {
                uuid: CHARACTERISTIC_SERVICE_CHANGED_UUID,
                permissions: CharacteristicPermissions::INDICATE,
                value: Vec::new(),
            }],
        },
    ]
}

/// The attribute protocol server that answers requests once connected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttServer: Send {
    /// Service pending attribute requests, without blocking.
    async fn poll(&mut self) -> std::result::Result<(), TransportError>;

    /// Drop any response data that has not been sent yet.
    fn clear_local_data(&mut self);
}

/// The table of services exposed by the local GATT server.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceTable: Send {
    /// Add a service to the table.
    fn add_service(&mut self, service: Service) -> Result<()>;
}

/// An ATT server shared by the adapter and the advertising task.
pub type SharedAttServer = Arc<tokio::sync::Mutex<dyn AttServer>>;

/// A service table shared by every advertisement of an adapter.
pub type SharedServiceTable = Arc<parking_lot::Mutex<dyn ServiceTable>>;
