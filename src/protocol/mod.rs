//! Collaborator interfaces.
//!
//! The GAP layer consumes the HCI transport, the attribute protocol server
//! and the service table through the traits defined here.

pub mod gatt;
pub mod hci;

pub use gatt::{
    generic_services, AttServer, CharacteristicConfig, CharacteristicPermissions, Service,
    ServiceTable, SharedAttServer, SharedServiceTable,
};
pub use hci::{
    shared_transport, AdvertisingParameters, AdvertisingReport, ConnectionComplete,
    CreateConnectionParameters, HciTransport, ScanParameters, SharedTransport, TransportError,
};
