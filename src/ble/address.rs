//! BLE device addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::protocol::hci::{ADDRESS_TYPE_PUBLIC, ADDRESS_TYPE_RANDOM};

/// A BLE device address.
///
/// The MAC is stored in controller (little-endian) byte order, the order it
/// has in HCI packets. `Display` and `FromStr` use the usual
/// most-significant-byte-first notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    /// MAC in controller byte order.
    pub mac: [u8; 6],
    /// Whether this is a random (as opposed to public) address.
    pub is_random: bool,
}

impl Address {
    /// Create a public address from controller-order bytes.
    pub const fn public(mac: [u8; 6]) -> Self {
        Self {
            mac,
            is_random: false,
        }
    }

    /// Create a random address from controller-order bytes.
    pub const fn random(mac: [u8; 6]) -> Self {
        Self {
            mac,
            is_random: true,
        }
    }

    /// Build an address from an HCI address type and controller-order bytes.
    pub fn from_hci(address_type: u8, mac: [u8; 6]) -> Self {
        Self {
            mac,
            is_random: address_type == ADDRESS_TYPE_RANDOM,
        }
    }

    /// The HCI address type of this address.
    pub fn hci_address_type(&self) -> u8 {
        if self.is_random {
            ADDRESS_TYPE_RANDOM
        } else {
            ADDRESS_TYPE_PUBLIC
        }
    }

    /// The MAC in display (most-significant-byte-first) order.
    pub fn to_display_bytes(&self) -> [u8; 6] {
        let mut bytes = self.mac;
        bytes.reverse();
        bytes
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_display_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for Address {
    type Err = Error;

    /// Parse `AA:BB:CC:DD:EE:FF` into a public address.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidParameter {
            name: "address".to_string(),
            value: s.to_string(),
        };

        if s.len() != 17 {
            return Err(invalid());
        }

        let mut mac = [0u8; 6];
        let mut parts = s.split(':');
        for slot in mac.iter_mut().rev() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self::public(mac))
    }
}
