//! BLE GAP module.
//!
//! This module provides the Generic Access Profile building blocks: the
//! advertising data codec, scanning and connection management.

pub mod address;
pub mod advertising;
pub mod connection;
pub mod registry;
pub mod scanner;
pub mod uuids;

pub use address::Address;
pub use advertising::{
    AdvertisementFields, AdvertisementPayload, ManufacturerDataElement, ServiceDataElement,
};
pub use connection::{Connection, ConnectionParams, Connector, NotificationRegistration};
pub use registry::ConnectionRegistry;
pub use scanner::{ScanResult, Scanner};
pub use uuids::*;
