//! HCI transport interface.
//!
//! The GAP layer never frames HCI packets itself. It drives a controller
//! through [`HciTransport`], which owns the serial/SPI link, sends LE
//! commands and decodes incoming events into at most one pending
//! [`AdvertisingReport`] and one pending [`ConnectionComplete`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Mutex;

/// HCI opcode of LE Set Scan Enable.
pub const OPCODE_LE_SET_SCAN_ENABLE: u16 = 0x200C;
/// HCI opcode of LE Set Scan Parameters.
pub const OPCODE_LE_SET_SCAN_PARAMETERS: u16 = 0x200B;
/// HCI opcode of LE Create Connection.
pub const OPCODE_LE_CREATE_CONNECTION: u16 = 0x200D;
/// HCI opcode of LE Create Connection Cancel.
pub const OPCODE_LE_CREATE_CONNECTION_CANCEL: u16 = 0x200E;
/// HCI opcode of Disconnect.
pub const OPCODE_DISCONNECT: u16 = 0x0406;
/// HCI opcode of LE Set Advertising Parameters.
pub const OPCODE_LE_SET_ADVERTISING_PARAMETERS: u16 = 0x2006;
/// HCI opcode of LE Set Advertising Data.
pub const OPCODE_LE_SET_ADVERTISING_DATA: u16 = 0x2008;
/// HCI opcode of LE Set Scan Response Data.
pub const OPCODE_LE_SET_SCAN_RESPONSE_DATA: u16 = 0x2009;
/// HCI opcode of LE Set Advertise Enable.
pub const OPCODE_LE_SET_ADVERTISE_ENABLE: u16 = 0x200A;

/// Disconnect reason "Remote User Terminated Connection".
pub const REASON_REMOTE_USER_TERMINATED: u8 = 0x13;

/// Peer/own address type: public device address.
pub const ADDRESS_TYPE_PUBLIC: u8 = 0x00;
/// Peer/own address type: random device address.
pub const ADDRESS_TYPE_RANDOM: u8 = 0x01;

/// Errors reported by the HCI transport and the other collaborators.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying serial/SPI link failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The controller completed a command with a non-zero status.
    #[error("Command {opcode:#06x} failed with status {status:#04x}")]
    CommandFailed {
        /// Opcode of the failed command.
        opcode: u16,
        /// HCI status code.
        status: u8,
    },

    /// The link to the controller is closed.
    #[error("Transport closed")]
    Closed,

    /// Any other collaborator failure.
    #[error("{0}")]
    Other(String),
}

/// Parameters of LE Set Scan Parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParameters {
    /// 0x00 passive, 0x01 active.
    pub scan_type: u8,
    /// Scan interval in 0.625 ms units.
    pub interval: u16,
    /// Scan window in 0.625 ms units.
    pub window: u16,
    /// Own address type.
    pub own_address_type: u8,
    /// Scanning filter policy.
    pub filter_policy: u8,
}

/// Parameters of LE Create Connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateConnectionParameters {
    /// Scan interval while initiating, 0.625 ms units.
    pub scan_interval: u16,
    /// Scan window while initiating, 0.625 ms units.
    pub scan_window: u16,
    /// Initiator filter policy.
    pub initiator_filter_policy: u8,
    /// Peer address type.
    pub peer_address_type: u8,
    /// Peer address in controller byte order.
    pub peer_address: [u8; 6],
    /// Own address type.
    pub own_address_type: u8,
    /// Minimum connection interval, 1.25 ms units.
    pub interval_min: u16,
    /// Maximum connection interval, 1.25 ms units.
    pub interval_max: u16,
    /// Peripheral latency in connection events.
    pub latency: u16,
    /// Supervision timeout, 10 ms units.
    pub supervision_timeout: u16,
    /// Minimum connection event length, 0.625 ms units.
    pub min_ce_length: u16,
    /// Maximum connection event length, 0.625 ms units.
    pub max_ce_length: u16,
}

/// Parameters of LE Set Advertising Parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParameters {
    /// Minimum advertising interval, 0.625 ms units.
    pub interval_min: u16,
    /// Maximum advertising interval, 0.625 ms units.
    pub interval_max: u16,
    /// Advertising type.
    pub advertising_type: u8,
    /// Own address type.
    pub own_address_type: u8,
    /// Peer address type (directed advertising only).
    pub peer_address_type: u8,
    /// Peer address (directed advertising only).
    pub peer_address: [u8; 6],
    /// Channel map, bit 0..2 for channels 37..39.
    pub channel_map: u8,
    /// Advertising filter policy.
    pub filter_policy: u8,
}

/// A pending LE Advertising Report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingReport {
    /// Advertiser address type as reported by the controller.
    pub peer_address_type: u8,
    /// Advertiser address in controller byte order.
    pub peer_address: [u8; 6],
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Declared length of the advertising data.
    pub data_length: u8,
    /// Raw advertising data.
    pub data: Bytes,
}

/// A pending LE Connection Complete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionComplete {
    /// HCI status, zero on success.
    pub status: u8,
    /// Connection handle assigned by the controller.
    pub handle: u16,
    /// 0x00 central, 0x01 peripheral.
    pub role: u8,
    /// Peer address type as reported by the controller.
    pub peer_address_type: u8,
    /// Peer address in controller byte order.
    pub peer_address: [u8; 6],
    /// Negotiated connection interval, 1.25 ms units.
    pub interval: u16,
    /// Negotiated peripheral latency.
    pub latency: u16,
    /// Negotiated supervision timeout, 10 ms units.
    pub supervision_timeout: u16,
}

/// Command and event access to a BLE controller.
///
/// Implementations are driven by a single caller at a time; the adapter keeps
/// them behind one async mutex.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HciTransport: Send {
    /// Enable or disable scanning.
    async fn le_set_scan_enable(
        &mut self,
        enabled: bool,
        filter_duplicates: bool,
    ) -> Result<(), TransportError>;

    /// Set the scan parameters.
    async fn le_set_scan_parameters(
        &mut self,
        params: &ScanParameters,
    ) -> Result<(), TransportError>;

    /// Start initiating a connection.
    async fn le_create_connection(
        &mut self,
        params: &CreateConnectionParameters,
    ) -> Result<(), TransportError>;

    /// Cancel an outstanding connection attempt.
    async fn le_create_connection_cancel(&mut self) -> Result<(), TransportError>;

    /// Terminate a connection.
    async fn disconnect(&mut self, handle: u16, reason: u8) -> Result<(), TransportError>;

    /// Set the advertising parameters.
    async fn le_set_advertising_parameters(
        &mut self,
        params: &AdvertisingParameters,
    ) -> Result<(), TransportError>;

    /// Set the advertising data, at most 31 bytes.
    async fn le_set_advertising_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Set the scan response data, at most 31 bytes.
    async fn le_set_scan_response_data(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Enable or disable advertising.
    async fn le_set_advertise_enable(&mut self, enabled: bool) -> Result<(), TransportError>;

    /// Process whatever the controller has sent, without blocking.
    ///
    /// At most one advertising report or one connection complete event becomes
    /// pending per call.
    async fn poll(&mut self) -> Result<(), TransportError>;

    /// The pending advertising report, if any.
    fn advertising_report(&self) -> Option<AdvertisingReport>;

    /// Drop the pending advertising report.
    fn clear_advertising_report(&mut self);

    /// The pending connection complete event, if any.
    fn connection_complete(&self) -> Option<ConnectionComplete>;

    /// Drop the pending connection complete event.
    fn clear_connection_complete(&mut self);
}

/// A transport shared by the scanner, the connector and the advertisement.
///
/// The lock is held for one command or one poll at a time.
pub type SharedTransport = Arc<Mutex<dyn HciTransport>>;

/// Wrap a transport for sharing.
pub fn shared_transport<T: HciTransport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}
