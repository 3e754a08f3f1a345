//! The durable record describing one bike.
//!
//! These fields come from the vendor's credential service: the MAC
//! address, the encryption key and the profile name are crucial to
//! connect, everything else is flavour text. The record is the only
//! state worth persisting between runs.

use serde::{Deserialize, Serialize};

use crate::cipher::KEY_SIZE;
use crate::error::{BikeError, Result};
use crate::hexstring;
use crate::profiles::{BikeProfile, Hardware, ProfileName};

/// The details of a bike, as reported by the vendor's web service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BikeDetails {
    /// The name of the bike (flavour text)
    pub name: String,
    /// The frame number (flavour text)
    pub frame_number: String,
    /// The bluetooth low energy profile of the bike
    pub ble_profile: ProfileName,
    /// The technical model name (flavour text)
    pub model_name: String,
    /// The MAC address of the bike
    pub mac_address: String,
    /// The key used to encrypt communication, as a hex string
    pub encryption_key: String,
    /// The smart module firmware version (flavour text)
    pub smart_module_version: Option<String>,
}

impl BikeDetails {
    /// Create a validated bike record.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::InvalidMacAddress`] if `mac_address` is not in
    /// MAC-48 format, or [`BikeError::InvalidEncryptionKey`] if
    /// `encryption_key` is not a 32 character hex string.
    pub fn new(
        name: impl Into<String>,
        frame_number: impl Into<String>,
        ble_profile: ProfileName,
        model_name: impl Into<String>,
        mac_address: impl Into<String>,
        encryption_key: impl Into<String>,
        smart_module_version: Option<String>,
    ) -> Result<Self> {
        let mac_address = mac_address.into();
        if !is_valid_mac_address(&mac_address) {
            return Err(BikeError::InvalidMacAddress(mac_address));
        }

        let encryption_key = encryption_key.into();
        if !is_valid_encryption_key(&encryption_key) {
            return Err(BikeError::InvalidEncryptionKey);
        }

        Ok(Self {
            name: name.into(),
            frame_number: frame_number.into(),
            ble_profile,
            model_name: model_name.into(),
            mac_address,
            encryption_key,
            smart_module_version,
        })
    }

    /// The decoded 16 byte encryption key
    #[must_use]
    pub fn key(&self) -> Vec<u8> {
        // validated at construction, cannot fail afterwards
        hexstring::from_hex(&self.encryption_key).unwrap_or_default()
    }

    /// The hardware profile for this bike, if the generation is supported
    #[must_use]
    pub fn profile(&self) -> Option<BikeProfile> {
        BikeProfile::named(&self.ble_profile)
    }

    /// Whether this crate supports the bike's hardware generation
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.profile().is_some()
    }

    /// The technical model of the bike
    ///
    /// Derived from the profile when supported, the reported model name
    /// otherwise.
    #[must_use]
    pub fn model(&self) -> &str {
        self.profile()
            .map_or(self.model_name.as_str(), |profile| profile.model())
    }

    /// The hardware capabilities of the bike, empty when unsupported
    #[must_use]
    pub fn hardware(&self) -> Hardware {
        self.profile().map(BikeProfile::hardware).unwrap_or_default()
    }

    /// The name the bike advertises over BLE: `VANMOOF-` followed by the
    /// last six hex digits of the MAC address.
    #[must_use]
    pub fn device_name(&self) -> String {
        let digits: String = self.mac_address.chars().filter(char::is_ascii_hexdigit).collect();
        format!("VANMOOF-{}", &digits[digits.len().saturating_sub(6)..])
    }
}

impl PartialEq for BikeDetails {
    fn eq(&self, other: &Self) -> bool {
        self.mac_address == other.mac_address
    }
}

impl Eq for BikeDetails {}

fn is_valid_mac_address(address: &str) -> bool {
    let bytes = address.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    bytes.iter().enumerate().all(|(index, byte)| {
        if index % 3 == 2 {
            *byte == b':' || *byte == b'-'
        } else {
            byte.is_ascii_hexdigit()
        }
    })
}

fn is_valid_encryption_key(key: &str) -> bool {
    key.len() == KEY_SIZE * 2 && key.bytes().all(|byte| byte.is_ascii_hexdigit())
}
