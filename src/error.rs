//! Error types for the hci-gap crate.

use thiserror::Error;

use crate::protocol::hci::TransportError;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The HCI transport or another collaborator reported a failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A scan was requested while one is already running.
    #[error("Scan already in progress")]
    ScanAlreadyActive,

    /// A scan stop was requested while no scan is running.
    #[error("Scan not in progress")]
    ScanNotActive,

    /// An advertisement operation was called in the wrong lifecycle state.
    #[error("Cannot {operation} advertisement while {state}")]
    InvalidAdvertisementState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the advertisement was in.
        state: String,
    },

    /// Another advertisement already owns the adapter's advertising set.
    #[error("Advertisement already in use")]
    AdvertisementInUse,

    /// Manufacturer data does not fit in the advertising packet.
    #[error("Manufacturer data too long: {needed} bytes exceed the {max}-byte packet")]
    ManufacturerDataTooLong {
        /// Packet length the element would have produced.
        needed: usize,
        /// Maximum packet length.
        max: usize,
    },

    /// Service data does not fit in the scan response packet.
    #[error("Service data too long: {needed} bytes exceed the {max}-byte packet")]
    ServiceDataTooLong {
        /// Packet length the element would have produced.
        needed: usize,
        /// Maximum packet length.
        max: usize,
    },

    /// Only 16-bit UUIDs can be used for service data.
    #[error("Unsupported service data UUID: {uuid}")]
    UnsupportedServiceDataUuid {
        /// The UUID that could not be encoded.
        uuid: String,
    },

    /// Failed to establish a connection to the peer.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// No active connection has the given handle.
    #[error("Connection not found: handle {handle:#06x}")]
    ConnectionNotFound {
        /// The connection handle that was looked up.
        handle: u16,
    },

    /// The controller reported a handle that is already tracked.
    #[error("Duplicate connection handle {handle:#06x}")]
    DuplicateConnectionHandle {
        /// The duplicated connection handle.
        handle: u16,
    },

    /// The service table rejected a service.
    #[error("Service registration failed: {reason}")]
    ServiceRegistration {
        /// Description of the failure.
        reason: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ManufacturerDataTooLong { needed: 33, max: 31 };
        assert_eq!(
            err.to_string(),
            "Manufacturer data too long: 33 bytes exceed the 31-byte packet"
        );

        let err = Error::ConnectionNotFound { handle: 0x40 };
        assert_eq!(err.to_string(), "Connection not found: handle 0x0040");

        let err = Error::InvalidAdvertisementState {
            operation: "start",
            state: "Unconfigured".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot start advertisement while Unconfigured");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: Error = TransportError::Closed.into();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
    }
}
