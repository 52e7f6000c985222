//! Advertising Data (AD) encoding and decoding.
//!
//! Advertising and scan response packets are sequences of AD structures:
//!
//! ```text
//! [length:1][type:1][value: length-1 bytes]
//! ```
//!
//! Each packet is capped at 31 bytes, enforced independently for the
//! advertising data and the scan response.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use uuid::Uuid;

use crate::ble::uuids::{uuid_from_le_bytes, uuid_from_u16, BluetoothUuidExt};
use crate::error::{Error, Result};

/// Maximum length of an advertising or scan response packet.
pub const MAX_PACKET_LEN: usize = 31;

/// Longest local name that still fits in a scan response as a whole.
pub const MAX_LOCAL_NAME_LEN: usize = MAX_PACKET_LEN - 2;

/// Flag bits carried in the Flags AD structure.
pub mod flags {
    /// LE Limited Discoverable Mode.
    pub const LE_LIMITED_DISCOVERABLE: u8 = 0x01;
    /// LE General Discoverable Mode.
    pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
    /// BR/EDR Not Supported.
    pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;
}

/// AD structure type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdType(pub u8);

impl AdType {
    /// Flags.
    pub const FLAGS: AdType = AdType(0x01);
    /// Incomplete list of 16-bit service UUIDs.
    pub const INCOMPLETE_16_SERVICE_LIST: AdType = AdType(0x02);
    /// Complete list of 16-bit service UUIDs.
    pub const COMPLETE_16_SERVICE_LIST: AdType = AdType(0x03);
    /// Incomplete list of 128-bit service UUIDs.
    pub const INCOMPLETE_128_SERVICE_LIST: AdType = AdType(0x06);
    /// Complete list of 128-bit service UUIDs.
    pub const COMPLETE_128_SERVICE_LIST: AdType = AdType(0x07);
    /// Shortened local name.
    pub const SHORT_LOCAL_NAME: AdType = AdType(0x08);
    /// Complete local name.
    pub const COMPLETE_LOCAL_NAME: AdType = AdType(0x09);
    /// Service data with a 16-bit UUID.
    pub const SERVICE_DATA_16: AdType = AdType(0x16);
    /// Manufacturer specific data.
    pub const MANUFACTURER_SPECIFIC_DATA: AdType = AdType(0xFF);
}

impl From<u8> for AdType {
    fn from(value: u8) -> Self {
        AdType(value)
    }
}

impl From<AdType> for u8 {
    fn from(value: AdType) -> Self {
        value.0
    }
}

/// Manufacturer specific data element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManufacturerDataElement {
    /// Bluetooth SIG company identifier.
    pub company_id: u16,
    /// Opaque payload.
    pub data: Vec<u8>,
}

/// Service data element.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceDataElement {
    /// Service UUID. Only 16-bit UUIDs can be encoded.
    pub uuid: Uuid,
    /// Opaque payload.
    pub data: Vec<u8>,
}

/// Fields carried by an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertisementFields {
    /// Local name, complete or shortened.
    pub local_name: Option<String>,
    /// Advertised service UUIDs in packet order.
    pub service_uuids: Vec<Uuid>,
    /// Manufacturer specific data elements in packet order.
    pub manufacturer_data: Vec<ManufacturerDataElement>,
    /// Service data elements in packet order.
    pub service_data: Vec<ServiceDataElement>,
}

impl AdvertisementFields {
    /// Check if a service UUID is advertised.
    pub fn has_service_uuid(&self, uuid: &Uuid) -> bool {
        self.service_uuids.contains(uuid)
    }

    /// Payload of the first manufacturer data element with this company ID.
    pub fn manufacturer_data_for(&self, company_id: u16) -> Option<&[u8]> {
        self.manufacturer_data
            .iter()
            .find(|m| m.company_id == company_id)
            .map(|m| m.data.as_slice())
    }

    /// Encode into an advertising packet and a scan response packet.
    pub fn encode(&self) -> Result<AdvertisementPayload> {
        Ok(AdvertisementPayload {
            advertising_data: encode_advertising_data(
                &self.service_uuids,
                &self.manufacturer_data,
            )?,
            scan_response: encode_scan_response(
                self.local_name.as_deref().unwrap_or_default(),
                &self.service_data,
            )?,
        })
    }
}

/// The two packets pushed to the controller when advertising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementPayload {
    /// Advertising data packet.
    pub advertising_data: Bytes,
    /// Scan response data packet.
    pub scan_response: Bytes,
}

/// Build an advertising data packet.
///
/// The packet starts with the Flags structure, then the service UUID if
/// exactly one is given, then each manufacturer data element. A 16-bit UUID
/// is written as a complete 16-bit list; any wider UUID takes the same slot
/// as a complete 128-bit list in little-endian order.
///
/// # Errors
///
/// Returns [`Error::ManufacturerDataTooLong`] as soon as an element would
/// push the packet past [`MAX_PACKET_LEN`].
pub fn encode_advertising_data(
    service_uuids: &[Uuid],
    manufacturer_data: &[ManufacturerDataElement],
) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(MAX_PACKET_LEN);

    buf.put_u8(2);
    buf.put_u8(AdType::FLAGS.into());
    buf.put_u8(flags::LE_GENERAL_DISCOVERABLE | flags::BR_EDR_NOT_SUPPORTED);

    match service_uuids {
        [] => {}
        [uuid] => match uuid.as_16bit() {
            Some(short) => {
                buf.put_u8(3);
                buf.put_u8(AdType::COMPLETE_16_SERVICE_LIST.into());
                buf.put_u16_le(short);
            }
            None => {
                buf.put_u8(17);
                buf.put_u8(AdType::COMPLETE_128_SERVICE_LIST.into());
                buf.put_slice(&uuid.to_le_bytes());
            }
        },
        _ => debug!(
            "Only one service UUID can be advertised, dropping {}",
            service_uuids.len()
        ),
    }

    for element in manufacturer_data {
        let needed = buf.len() + 4 + element.data.len();
        if needed > MAX_PACKET_LEN {
            return Err(Error::ManufacturerDataTooLong {
                needed,
                max: MAX_PACKET_LEN,
            });
        }

        buf.put_u8(3 + element.data.len() as u8);
        buf.put_u8(AdType::MANUFACTURER_SPECIFIC_DATA.into());
        buf.put_u16_le(element.company_id);
        buf.put_slice(&element.data);
    }

    Ok(buf.freeze())
}

/// Build a scan response packet.
///
/// The local name comes first: names longer than [`MAX_LOCAL_NAME_LEN`]
/// bytes are cut at a character boundary and marked as shortened. Each
/// service data element follows.
///
/// # Errors
///
/// Returns [`Error::ServiceDataTooLong`] as soon as an element would push
/// the packet past [`MAX_PACKET_LEN`], and
/// [`Error::UnsupportedServiceDataUuid`] for a service UUID that is not
/// 16-bit.
pub fn encode_scan_response(
    local_name: &str,
    service_data: &[ServiceDataElement],
) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(MAX_PACKET_LEN);

    if !local_name.is_empty() {
        let (name, ad_type) = if local_name.len() > MAX_LOCAL_NAME_LEN {
            (
                truncate_to_char_boundary(local_name, MAX_LOCAL_NAME_LEN),
                AdType::SHORT_LOCAL_NAME,
            )
        } else {
            (local_name, AdType::COMPLETE_LOCAL_NAME)
        };

        buf.put_u8(1 + name.len() as u8);
        buf.put_u8(ad_type.into());
        buf.put_slice(name.as_bytes());
    }

    for element in service_data {
        let needed = buf.len() + 4 + element.data.len();
        if needed > MAX_PACKET_LEN {
            return Err(Error::ServiceDataTooLong {
                needed,
                max: MAX_PACKET_LEN,
            });
        }

        let short = element
            .uuid
            .as_16bit()
            .ok_or_else(|| Error::UnsupportedServiceDataUuid {
                uuid: element.uuid.to_string(),
            })?;

        buf.put_u8(3 + element.data.len() as u8);
        buf.put_u8(AdType::SERVICE_DATA_16.into());
        buf.put_u16_le(short);
        buf.put_slice(&element.data);
    }

    Ok(buf.freeze())
}

/// Decode the AD structures in the first `length` bytes of `raw`.
///
/// Decoding stops at a zero length byte or at a structure that runs past
/// `length`; nothing beyond `length` (or the end of `raw`) is read.
/// Unknown structure types, including Flags, are skipped.
pub fn decode(raw: &[u8], length: usize) -> AdvertisementFields {
    let data = &raw[..length.min(raw.len())];
    let mut fields = AdvertisementFields::default();
    let mut offset = 0;

    while offset + 1 < data.len() {
        let len = data[offset] as usize;
        if len < 1 {
            break;
        }

        let end = offset + 1 + len;
        if end > data.len() {
            break;
        }

        let value = &data[offset + 2..end];
        match AdType(data[offset + 1]) {
            AdType::INCOMPLETE_16_SERVICE_LIST | AdType::COMPLETE_16_SERVICE_LIST => {
                fields.service_uuids.extend(
                    value
                        .chunks_exact(2)
                        .map(|c| uuid_from_u16(u16::from_le_bytes([c[0], c[1]]))),
                );
            }
            AdType::INCOMPLETE_128_SERVICE_LIST | AdType::COMPLETE_128_SERVICE_LIST => {
                for chunk in value.chunks_exact(16) {
                    let mut bytes = [0u8; 16];
                    bytes.copy_from_slice(chunk);
                    fields.service_uuids.push(uuid_from_le_bytes(bytes));
                }
            }
            AdType::SHORT_LOCAL_NAME | AdType::COMPLETE_LOCAL_NAME => {
                fields.local_name = Some(String::from_utf8_lossy(value).into_owned());
            }
            AdType::SERVICE_DATA_16 if value.len() >= 2 => {
                fields.service_data.push(ServiceDataElement {
                    uuid: uuid_from_u16(u16::from_le_bytes([value[0], value[1]])),
                    data: value[2..].to_vec(),
                });
            }
            AdType::MANUFACTURER_SPECIFIC_DATA if value.len() >= 2 => {
                fields.manufacturer_data.push(ManufacturerDataElement {
                    company_id: u16::from_le_bytes([value[0], value[1]]),
                    data: value[2..].to_vec(),
                });
            }
            _ => {}
        }

        offset = end;
    }

    fields
}

fn truncate_to_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
