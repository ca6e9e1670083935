//! Utilities for dealing with BLE UUIDs: expanding short forms typed on a command line and
//! printing UUIDs back in their short form where one exists.

use std::fmt::Write;
use uuid::Uuid;

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BLUETOOTH_BASE_MASK: u128 = 0x00000000_ffff_ffff_ffff_ffffffffffff;
const BLUETOOTH_BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;

/// Convert a 32-bit BLE short UUID to a full 128-bit UUID by filling in the standard Bluetooth Base
/// UUID.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Convert a 16-bit BLE short UUID to a full 128-bit UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseBleUuidError {
    #[error("empty UUID")]
    Empty,
    #[error("'{0}' is neither a 16/32-bit short UUID nor a 128-bit UUID")]
    Malformed(String),
}

/// Parses a service or peripheral identifier as written by a user.
///
/// Accepts a full hyphenated or simple 128-bit UUID, or a 16/32-bit short UUID (4 or 8 hex
/// digits, optionally prefixed with `0x`) which is expanded with the Bluetooth base UUID.
pub fn parse_ble_uuid(input: &str) -> Result<Uuid, ParseBleUuidError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseBleUuidError::Empty);
    }
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let malformed = || ParseBleUuidError::Malformed(input.to_owned());
    match digits.len() {
        4 => u16::from_str_radix(digits, 16)
            .map(uuid_from_u16)
            .map_err(|_| malformed()),
        8 => u32::from_str_radix(digits, 16)
            .map(uuid_from_u32)
            .map_err(|_| malformed()),
        _ if digits.len() == trimmed.len() => Uuid::parse_str(trimmed).map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

/// An extension trait for `Uuid` which provides BLE-specific methods.
pub trait BleUuid {
    /// If the UUID is a valid BLE short UUID then return its short form, otherwise return `None`.
    fn to_ble_u32(&self) -> Option<u32>;

    /// If the UUID is a valid 16-bit BLE short UUID then return its short form, otherwise return
    /// `None`.
    fn to_ble_u16(&self) -> Option<u16>;

    /// Convert the UUID to a string, using short format if applicable.
    fn to_short_string(&self) -> String;
}

impl BleUuid for Uuid {
    fn to_ble_u32(&self) -> Option<u32> {
        let value = self.as_u128();
        if value & BLUETOOTH_BASE_MASK == BLUETOOTH_BASE_UUID {
            Some((value >> 96) as u32)
        } else {
            None
        }
    }

    fn to_ble_u16(&self) -> Option<u16> {
        let value = self.as_u128();
        if value & BLUETOOTH_BASE_MASK_16 == BLUETOOTH_BASE_UUID {
            Some((value >> 96) as u16)
        } else {
            None
        }
    }

    fn to_short_string(&self) -> String {
        if let Some(uuid16) = self.to_ble_u16() {
            format!("{:#06x}", uuid16)
        } else if let Some(uuid32) = self.to_ble_u32() {
            format!("{:#010x}", uuid32)
        } else {
            self.to_string()
        }
    }
}

/// Joins a list of UUIDs into a comma separated list of their short strings.
pub fn short_list(uuids: &[Uuid]) -> String {
    let mut out = String::new();
    for (i, uuid) in uuids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", uuid.to_short_string());
    }
    out
}
