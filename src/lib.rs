// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hci-gap
//!
//! The Generic Access Profile layer of a Bluetooth Low Energy host that
//! talks to its controller over raw HCI.
//!
//! ## Features
//!
//! - **Scanning**: Passive scanning with decoded advertising reports
//! - **Advertising**: Advertising and scan response packets built from typed
//!   fields, with the ATT server kept polled while on air
//! - **Connections**: Central connection establishment with a deadline and
//!   a registry of live links
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//!
//! use hci_gap::{Adapter, AttServer, HciTransport, Result, ServiceTable};
//!
//! async fn run(
//!     hci: impl HciTransport + 'static,
//!     att: impl AttServer + 'static,
//!     services: impl ServiceTable + 'static,
//! ) -> Result<()> {
//!     let adapter = Adapter::new(hci, att, services);
//!
//!     adapter
//!         .scan(|result| {
//!             println!("{} {} dBm {:?}", result.address, result.rssi, result.fields.local_name);
//!             if result.fields.local_name.as_deref() == Some("Go Bluetooth") {
//!                 ControlFlow::Break(())
//!             } else {
//!                 ControlFlow::Continue(())
//!             }
//!         })
//!         .await
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod adapter;
pub mod advertisement;
pub mod ble;
pub mod config;
pub mod error;
pub mod protocol;

// Re-exports for convenience
pub use adapter::Adapter;
pub use advertisement::{Advertisement, AdvertisementOptions, AdvertisementState, AdvertisingType};
pub use config::{ConnectionDefaults, GapConfig};
pub use error::{Error, Result};

// Re-export commonly used types from submodules
pub use ble::{
    Address, AdvertisementFields, Connection, ConnectionParams, ConnectionRegistry,
    ManufacturerDataElement, NotificationRegistration, ScanResult, ServiceDataElement,
};
pub use protocol::{AttServer, HciTransport, Service, ServiceTable, TransportError};
