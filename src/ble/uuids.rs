//! Bluetooth UUIDs.
//!
//! Short (16-bit and 32-bit) Bluetooth UUIDs are aliases into the Bluetooth
//! Base UUID `00000000-0000-1000-8000-00805F9B34FB`.

use uuid::Uuid;

/// The Bluetooth Base UUID.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb);

const BASE: u128 = BLUETOOTH_BASE_UUID.as_u128();
const SHORT_16_MASK: u128 = 0x0000_ffff << 96;
const SHORT_32_MASK: u128 = 0xffff_ffff << 96;

/// Build a full UUID from a 16-bit Bluetooth UUID.
pub const fn uuid_from_u16(value: u16) -> Uuid {
    Uuid::from_u128(BASE | ((value as u128) << 96))
}

/// Build a full UUID from a 32-bit Bluetooth UUID.
pub const fn uuid_from_u32(value: u32) -> Uuid {
    Uuid::from_u128(BASE | ((value as u128) << 96))
}

// GATT services
/// Generic Access service UUID.
pub const SERVICE_GENERIC_ACCESS_UUID: Uuid = uuid_from_u16(0x1800);
/// Generic Attribute service UUID.
pub const SERVICE_GENERIC_ATTRIBUTE_UUID: Uuid = uuid_from_u16(0x1801);

// GATT characteristics
/// Device Name characteristic UUID.
pub const CHARACTERISTIC_DEVICE_NAME_UUID: Uuid = uuid_from_u16(0x2A00);
/// Appearance characteristic UUID.
pub const CHARACTERISTIC_APPEARANCE_UUID: Uuid = uuid_from_u16(0x2A01);
/// Service Changed characteristic UUID.
pub const CHARACTERISTIC_SERVICE_CHANGED_UUID: Uuid = uuid_from_u16(0x2A05);
/// Temperature characteristic UUID.
pub const CHARACTERISTIC_TEMPERATURE_UUID: Uuid = uuid_from_u16(0x2A6E);

/// Appearance value "Generic Sensor".
pub const APPEARANCE_GENERIC_SENSOR: u16 = 0x0540;

/// Short-form queries on Bluetooth UUIDs.
pub trait BluetoothUuidExt {
    /// Check if this UUID is a 16-bit alias of the Base UUID.
    fn is_16bit(&self) -> bool;

    /// Check if this UUID is a 32-bit alias of the Base UUID.
    ///
    /// Every 16-bit UUID is also a 32-bit UUID.
    fn is_32bit(&self) -> bool;

    /// The 16-bit value, if this is a 16-bit UUID.
    fn as_16bit(&self) -> Option<u16>;

    /// The 32-bit value, if this is a 32-bit UUID.
    fn as_32bit(&self) -> Option<u32>;

    /// The UUID in over-the-air (little-endian) byte order.
    fn to_le_bytes(&self) -> [u8; 16];
}

impl BluetoothUuidExt for Uuid {
    fn is_16bit(&self) -> bool {
        self.as_u128() & !SHORT_16_MASK == BASE
    }

    fn is_32bit(&self) -> bool {
        self.as_u128() & !SHORT_32_MASK == BASE
    }

    fn as_16bit(&self) -> Option<u16> {
        self.is_16bit().then(|| (self.as_u128() >> 96) as u16)
    }

    fn as_32bit(&self) -> Option<u32> {
        self.is_32bit().then(|| (self.as_u128() >> 96) as u32)
    }

    fn to_le_bytes(&self) -> [u8; 16] {
        self.as_u128().to_le_bytes()
    }
}

/// Build a UUID from over-the-air (little-endian) bytes.
pub fn uuid_from_le_bytes(bytes: [u8; 16]) -> Uuid {
    Uuid::from_u128(u128::from_le_bytes(bytes))
}
